//! Provider display labels

use std::collections::HashMap;

/// Provider ids shown under another label by default
const DEFAULT_PROVIDER_ALIASES: &[(&str, &str)] = &[("vertex", "google")];

/// Canonical provider id → user-facing label
///
/// Labels are cosmetic. Slugs and canonical fields always come from the
/// canonical id.
#[derive(Debug, Clone)]
pub struct ProviderAliases {
    aliases: HashMap<String, String>,
}

impl Default for ProviderAliases {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_PROVIDER_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl ProviderAliases {
    /// No aliases at all
    pub fn none() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Defaults overlaid with configured aliases
    pub fn from_config<'a>(
        configured: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        let mut aliases = Self::default();
        for (from, to) in configured {
            aliases.insert(from.as_str(), to.as_str());
        }
        aliases
    }

    pub fn insert(&mut self, provider: impl Into<String>, label: impl Into<String>) {
        self.aliases.insert(provider.into(), label.into());
    }

    /// Label for a canonical provider id (the id itself when unaliased)
    pub fn label_for<'a>(&'a self, provider: &'a str) -> &'a str {
        self.aliases.get(provider).map(String::as_str).unwrap_or(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_shown_as_google() {
        let aliases = ProviderAliases::default();
        assert_eq!(aliases.label_for("vertex"), "google");
        assert_eq!(aliases.label_for("openai"), "openai");
    }

    #[test]
    fn test_configured_alias_overrides_default() {
        let mut configured = HashMap::new();
        configured.insert("vertex".to_string(), "Google Cloud".to_string());
        configured.insert("bedrock".to_string(), "aws".to_string());

        let aliases = ProviderAliases::from_config(&configured);
        assert_eq!(aliases.label_for("vertex"), "Google Cloud");
        assert_eq!(aliases.label_for("bedrock"), "aws");
    }

    #[test]
    fn test_none_passes_everything_through() {
        assert_eq!(ProviderAliases::none().label_for("vertex"), "vertex");
    }
}
