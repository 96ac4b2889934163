//! Naming conventions for relationship types and folded property keys.

use tessera_core::defaults;

/// Split a label into words on separators, lower-to-upper transitions, and
/// the end of an acronym (`HTTPServer` -> `HTTP`, `Server`).
fn split_words(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Normalize a relationship type to UPPER_SNAKE_CASE.
///
/// `works at`, `worksAt`, and `works-at` all become `WORKS_AT`; the
/// `:INFERRED` suffix becomes `_INFERRED`.
///
/// ```
/// use tessera_ingest::normalize_rel_type;
///
/// assert_eq!(normalize_rel_type("worksAt"), "WORKS_AT");
/// assert_eq!(normalize_rel_type("MENTIONS:INFERRED"), "MENTIONS_INFERRED");
/// ```
pub fn normalize_rel_type(raw: &str) -> String {
    split_words(raw)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Property key a `HAS_<T>` relationship folds into: camelCase of `T`.
///
/// Returns `None` for types without the `HAS_` prefix or with nothing after it.
pub fn fold_key(rel_type: &str) -> Option<String> {
    let normalized = normalize_rel_type(rel_type);
    let rest = normalized.strip_prefix(defaults::PROPERTY_REL_PREFIX)?;
    let mut words = rest.split('_').filter(|w| !w.is_empty());
    let first = words.next()?.to_lowercase();
    Some(words.fold(first, |mut key, word| {
        key.push_str(&capitalize(&word.to_lowercase()));
        key
    }))
}

/// Plural overflow key for repeated folded values: `email` -> `additionalEmails`.
pub fn additional_key(key: &str) -> String {
    format!(
        "{}{}s",
        defaults::ADDITIONAL_PROPERTY_PREFIX,
        capitalize(key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rel_type_variants() {
        assert_eq!(normalize_rel_type("works at"), "WORKS_AT");
        assert_eq!(normalize_rel_type("worksAt"), "WORKS_AT");
        assert_eq!(normalize_rel_type("works-at"), "WORKS_AT");
        assert_eq!(normalize_rel_type("WORKS_AT"), "WORKS_AT");
        assert_eq!(normalize_rel_type("  Works_At  "), "WORKS_AT");
    }

    #[test]
    fn test_normalize_rel_type_inferred_suffix() {
        assert_eq!(normalize_rel_type("KNOWS:INFERRED"), "KNOWS_INFERRED");
        assert_eq!(normalize_rel_type("collaborates with:INFERRED"), "COLLABORATES_WITH_INFERRED");
    }

    #[test]
    fn test_normalize_rel_type_acronyms_and_digits() {
        assert_eq!(normalize_rel_type("hostsHTTPServer"), "HOSTS_HTTP_SERVER");
        assert_eq!(normalize_rel_type("ISO9001Certified"), "ISO9001_CERTIFIED");
        assert_eq!(normalize_rel_type(""), "");
    }

    #[test]
    fn test_fold_key() {
        assert_eq!(fold_key("HAS_EMAIL").as_deref(), Some("email"));
        assert_eq!(fold_key("HAS_PHONE_NUMBER").as_deref(), Some("phoneNumber"));
        assert_eq!(fold_key("hasEmailAddress").as_deref(), Some("emailAddress"));
        assert_eq!(fold_key("WORKS_AT"), None);
        assert_eq!(fold_key("HAS_"), None);
    }

    #[test]
    fn test_additional_key() {
        assert_eq!(additional_key("email"), "additionalEmails");
        assert_eq!(additional_key("phoneNumber"), "additionalPhoneNumbers");
    }
}
