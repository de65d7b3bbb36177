//! URL slugs for canonical ids

/// Slug for a canonical id
///
/// Lowercases, keeps only `[a-z0-9 ]`, joins runs of spaces with a single
/// hyphen and trims hyphens at the ends. May return an empty string.
pub fn slugify(id: &str) -> String {
    let kept: String = id
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();
    kept.split(' ')
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
