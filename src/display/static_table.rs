//! Static display-name table
//!
//! Pure dictionary lookup keyed by canonical model id. Unmapped ids pass
//! through unchanged.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{DisplayEntry, DisplayMapper, DisplayResolver, Resolution, ResolutionSource};
use crate::ingest::CanonicalKey;

/// Well-known dated or vendor-prefixed spellings and their display names
const BUILTIN_MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4-0613", "gpt-4"),
    ("gpt-4-0314", "gpt-4"),
    ("gpt-4-1106-preview", "gpt-4-turbo"),
    ("gpt-4-0125-preview", "gpt-4-turbo"),
    ("gpt-4-turbo-2024-04-09", "gpt-4-turbo"),
    ("gpt-4o-2024-05-13", "gpt-4o"),
    ("gpt-4o-2024-08-06", "gpt-4o"),
    ("gpt-4o-mini-2024-07-18", "gpt-4o-mini"),
    ("gpt-3.5-turbo-0125", "gpt-3.5-turbo"),
    ("gpt-3.5-turbo-1106", "gpt-3.5-turbo"),
    ("claude-3-opus-20240229", "claude-3-opus"),
    ("claude-3-sonnet-20240229", "claude-3-sonnet"),
    ("claude-3-haiku-20240307", "claude-3-haiku"),
    ("claude-3-5-sonnet-20240620", "claude-3.5-sonnet"),
    ("claude-3-5-sonnet-20241022", "claude-3.5-sonnet"),
    ("gemini-1.5-pro-001", "gemini-1.5-pro"),
    ("gemini-1.5-pro-002", "gemini-1.5-pro"),
    ("gemini-1.5-flash-001", "gemini-1.5-flash"),
    ("gemini-1.5-flash-002", "gemini-1.5-flash"),
    ("meta-llama/Meta-Llama-3-70B-Instruct", "llama-3-70b-instruct"),
    ("meta-llama/Meta-Llama-3-8B-Instruct", "llama-3-8b-instruct"),
    ("mistralai/Mixtral-8x7B-Instruct-v0.1", "mixtral-8x7b-instruct"),
];

/// Model-id → display-name dictionary
#[derive(Debug, Clone, Default)]
pub struct StaticDisplayTable {
    by_model: HashMap<String, String>,
}

impl StaticDisplayTable {
    /// Empty table (everything passes through)
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in aliases
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (model, display) in BUILTIN_MODEL_ALIASES {
            table.insert(*model, *display);
        }
        table
    }

    /// Add or override one mapping
    pub fn insert(&mut self, model: impl Into<String>, display_name: impl Into<String>) {
        self.by_model.insert(model.into(), display_name.into());
    }

    /// Builder form of [`Self::insert`]
    pub fn with_alias(mut self, model: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.insert(model, display_name);
        self
    }

    /// Merge configured aliases over the current table
    pub fn extend<'a>(&mut self, aliases: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (model, display) in aliases {
            self.insert(model.as_str(), display.as_str());
        }
    }

    /// Mapped display name, `None` if unmapped
    pub fn mapped(&self, model: &str) -> Option<&str> {
        self.by_model.get(model).map(String::as_str)
    }

    /// Mapped display name or the input unchanged
    pub fn display_name_for<'a>(&'a self, model: &'a str) -> &'a str {
        self.mapped(model).unwrap_or(model)
    }

    pub fn len(&self) -> usize {
        self.by_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }
}

#[async_trait]
impl DisplayResolver for StaticDisplayTable {
    fn name(&self) -> &'static str {
        "static-table"
    }

    fn source(&self) -> ResolutionSource {
        ResolutionSource::StaticTable
    }

    async fn lookup(&self, key: &CanonicalKey) -> Option<DisplayEntry> {
        self.mapped(key.model()).map(DisplayEntry::named)
    }
}

#[async_trait]
impl DisplayMapper for StaticDisplayTable {
    async fn resolve(&self, key: &CanonicalKey) -> Resolution {
        match self.mapped(key.model()) {
            Some(display) => Resolution {
                entry: DisplayEntry::named(display),
                source: ResolutionSource::StaticTable,
            },
            None => Resolution::canonical(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_collapses_dated_spellings() {
        let table = StaticDisplayTable::builtin();
        assert_eq!(table.display_name_for("gpt-4-0613"), "gpt-4");
        assert_eq!(table.display_name_for("gpt-4-0314"), "gpt-4");
    }

    #[test]
    fn test_unmapped_passes_through() {
        let table = StaticDisplayTable::builtin();
        assert_eq!(table.display_name_for("my-custom-model"), "my-custom-model");
        assert!(table.mapped("my-custom-model").is_none());
    }

    #[test]
    fn test_configured_aliases_override_builtin() {
        let mut table = StaticDisplayTable::builtin();
        let mut configured = HashMap::new();
        configured.insert("gpt-4-0613".to_string(), "GPT-4 (June)".to_string());
        table.extend(&configured);
        assert_eq!(table.display_name_for("gpt-4-0613"), "GPT-4 (June)");
    }

    #[tokio::test]
    async fn test_mapper_reports_source() {
        let table = StaticDisplayTable::new().with_alias("a-1", "a");

        let mapped = table.resolve(&CanonicalKey::new("p", "a-1")).await;
        assert_eq!(mapped.entry.display_name, "a");
        assert_eq!(mapped.source, ResolutionSource::StaticTable);

        let passthrough = table.resolve(&CanonicalKey::new("p", "b")).await;
        assert_eq!(passthrough.entry.display_name, "b");
        assert_eq!(passthrough.source, ResolutionSource::Canonical);
    }
}
