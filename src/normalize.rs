//! Memo cleanup: a human-readable display string and a canonical lookup key.

use std::sync::OnceLock;

use regex::Regex;

const KEY_MAX_CHARS: usize = 64;

fn processor_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?:\bSQ\s*\*|\bTST\s*\*|\bPAYPAL\s*\*|\bSP\s*\*|\bPP\s*\*|\bDD\s*\*",
            r"|\bDEBIT CARD PURCHASE\b|\bPURCHASE AUTHORIZED ON\b|\bRECURRING PAYMENT\b",
            r"|\bCHECKCARD\b|\bPOS\b|\bACH\b|\bWEB ID:?|\bPPD ID:?)"
        ))
        .expect("processor token pattern")
    })
}

fn numeric_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4,}\b").expect("numeric id pattern"))
}

/// Display text: processor tokens and long numeric ids removed, restricted
/// to letters, digits and `&.,/-`, whitespace collapsed, title-cased.
pub fn clean_memo(raw: &str) -> String {
    let s = processor_token_re().replace_all(raw, " ");
    let s = numeric_id_re().replace_all(&s, " ");
    let filtered: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || "&.,/-".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    filtered
        .split_whitespace()
        .map(title_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Lookup key: lowercase letters and single spaces only, bounded length.
/// Identical memos in any casing or spacing map to the same key.
pub fn canonical_key(raw: &str) -> String {
    let letters: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();
    let collapsed = letters.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(KEY_MAX_CHARS).collect();
    truncated.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_ignores_case_spacing_and_digits() {
        assert_eq!(canonical_key("Chick Fil A  #123"), canonical_key("chick fil a #123"));
        assert_eq!(canonical_key("Chick Fil A  #123"), "chick fil a");
    }

    #[test]
    fn test_canonical_key_is_bounded() {
        let long = "word ".repeat(40);
        let key = canonical_key(&long);
        assert!(key.chars().count() <= KEY_MAX_CHARS);
        assert!(!key.ends_with(' '));
    }

    #[test]
    fn test_canonical_key_empty_for_numeric_memo() {
        assert_eq!(canonical_key("#1234 5678"), "");
    }

    #[test]
    fn test_clean_memo_title_cases() {
        assert_eq!(clean_memo("STARBUCKS STORE #123"), "Starbucks Store 123");
    }

    #[test]
    fn test_clean_memo_strips_processor_tokens_and_ids() {
        assert_eq!(clean_memo("SQ *BLUE BOTTLE COFFEE 88812345"), "Blue Bottle Coffee");
        assert_eq!(clean_memo("tst* Joe's Pizza"), "Joe S Pizza");
        assert_eq!(clean_memo("PAYPAL *NETFLIX.COM"), "Netflix.com");
        assert_eq!(clean_memo("POS DEBIT CARD PURCHASE H-E-B 0455"), "H-e-b");
    }

    #[test]
    fn test_clean_memo_keeps_short_numbers() {
        assert_eq!(clean_memo("7-ELEVEN 123"), "7-eleven 123");
    }
}
