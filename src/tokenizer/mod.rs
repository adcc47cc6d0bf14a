//! Query and field tokenization.
//!
//! All matching in the core operates on normalized tokens: NFKD-decomposed,
//! combining marks stripped, case-folded, split on non-alphanumeric
//! boundaries. The same normalization is applied at index time and at query
//! time so the two sides always compare equal forms.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes a single token: NFKD, strip combining marks, lowercase.
pub fn normalize(token: &str) -> String {
    token
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Splits text into normalized tokens on non-alphanumeric boundaries.
///
/// Empty tokens are dropped; the relative order of tokens is preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(tokenize("Amazing Shoes"), vec!["amazing", "shoes"]);
        assert_eq!(tokenize("  the   train "), vec!["the", "train"]);
    }

    #[test]
    fn test_tokenize_punctuation() {
        assert_eq!(tokenize("rock-and-roll!"), vec!["rock", "and", "roll"]);
    }

    #[test]
    fn test_normalize_diacritics() {
        assert_eq!(normalize("Crème"), "creme");
        assert_eq!(normalize("ÅNGSTRÖM"), "angstrom");
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   --- ").is_empty());
    }
}
