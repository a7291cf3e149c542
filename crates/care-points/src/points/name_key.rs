use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Comparison form of a person's display name.
///
/// Two names map to the same key when they differ only in spacing, character
/// width (full-width Latin, ideographic space) or case. All whitespace is
/// removed rather than collapsed, so `"山田 太郎"` and `"山田太郎"` match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameKey(String);

impl NameKey {
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substring match on the normalized form; an empty fragment matches every key.
    pub fn contains(&self, fragment: &NameKey) -> bool {
        self.0.contains(fragment.as_str())
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NameKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// NFKC, then drop whitespace and zero-width marks, then Unicode lowercase.
pub fn normalize(raw: &str) -> String {
    raw.nfkc()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\u{feff}' | '\u{200b}'))
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_matches_normalized_fragments() {
        let key = NameKey::new("山田 太郎");
        assert!(key.contains(&NameKey::new("田太")));
        assert!(key.contains(&NameKey::new("")));
        assert!(NameKey::new("Taro Yamada").contains(&NameKey::new("ＹＡＭＡ")));
        assert!(!key.contains(&NameKey::new("花子")));
    }

    #[test]
    fn ignores_spacing_width_and_case() {
        assert_eq!(normalize(" 山田 太郎 "), normalize("山田太郎"));
        assert_eq!(normalize("山田\u{3000}太郎"), "山田太郎");
        assert_eq!(normalize("ＹＡＭＡＤＡ"), "yamada");
        assert_eq!(normalize("Taro  Yamada"), normalize("taro yamada"));
    }

    #[test]
    fn strips_byte_order_marks() {
        assert_eq!(normalize("\u{feff}Hanako\u{200b}"), "hanako");
    }

    #[test]
    fn empty_and_blank_inputs_produce_empty_keys() {
        assert!(NameKey::new("").is_empty());
        assert!(NameKey::new(" \t\u{3000} ").is_empty());
    }

    #[test]
    fn key_displays_normalized_form() {
        assert_eq!(NameKey::from("Ｔａｒｏ").to_string(), "taro");
    }
}
