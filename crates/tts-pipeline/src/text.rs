//! Text normalization and tokenization
//!
//! Input text is cleaned to a small allow-list (alphanumerics, whitespace and
//! `,.?!`) and then mapped to symbol ids through a constant table.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Symbols with a dedicated id. Id `n` is `SYMBOLS[n - 1]`; id 0 is
/// reserved for unknown characters and padding.
pub const SYMBOLS: &str = "abcdefghijklmnopqrstuvwxyz ,.?!";

/// Number of ids in the table, including the unknown id.
pub const VOCAB_SIZE: usize = SYMBOLS.len() + 1;

/// Id assigned to characters outside the table
pub const UNKNOWN_ID: u32 = 0;

static DISALLOWED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}\s,.?!]").unwrap());

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static SYMBOL_TABLE: LazyLock<[u32; 128]> = LazyLock::new(|| {
    let mut table = [UNKNOWN_ID; 128];
    for (i, b) in SYMBOLS.bytes().enumerate() {
        table[b as usize] = i as u32 + 1;
    }
    table
});

/// Ordered symbol ids for one piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenSequence(Vec<u32>);

impl TokenSequence {
    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u32> {
        self.0
    }
}

impl From<Vec<u32>> for TokenSequence {
    fn from(ids: Vec<u32>) -> Self {
        Self(ids)
    }
}

/// Canonicalize text before tokenization.
///
/// Never fails; the empty string cleans to the empty string.
///
/// ```
/// use tts_pipeline::text::clean;
///
/// assert_eq!(clean("  Hello,\t\tworld! :) "), "Hello, world!");
/// ```
pub fn clean(text: &str) -> String {
    let kept = DISALLOWED_REGEX.replace_all(text, "");
    WHITESPACE_REGEX.replace_all(&kept, " ").trim().to_string()
}

/// Map text to symbol ids, one per input character. Lower-cases before lookup.
pub fn encode(text: &str) -> TokenSequence {
    let table = &*SYMBOL_TABLE;
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .map(|c| {
            if c.is_ascii() {
                table[c as usize]
            } else {
                UNKNOWN_ID
            }
        })
        .collect::<Vec<_>>()
        .into()
}

/// Inverse of [`encode`] for known ids; unknown ids are skipped.
pub fn decode(tokens: &TokenSequence) -> String {
    let symbols = SYMBOLS.as_bytes();
    tokens
        .ids()
        .iter()
        .filter_map(|&id| match id {
            0 => None,
            id => symbols.get(id as usize - 1).map(|&b| b as char),
        })
        .collect()
}

/// Clean, validate and encode request text.
///
/// Fails with [`Error::InvalidInput`] when nothing is left after cleaning or
/// the cleaned text is longer than `max_chars`.
pub fn prepare(text: &str, max_chars: usize) -> Result<TokenSequence> {
    let cleaned = clean(text);
    if cleaned.is_empty() {
        return Err(Error::InvalidInput(
            "text is empty after normalization".to_string(),
        ));
    }
    let len = cleaned.chars().count();
    if len > max_chars {
        return Err(Error::InvalidInput(format!(
            "text has {} characters after normalization, limit is {}",
            len, max_chars
        )));
    }
    Ok(encode(&cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "Hello world!",
        "  leading and trailing  ",
        "tabs\tand\nnewlines\r\n\r\nhere",
        "symbols: @#$%^&*()[]{}<>/\\|~`'\"",
        "Ünïcödé wörds, 日本語 too?",
        "numbers 1,000.50 and under_scores",
        "!!!...???,,,",
        "emoji 🎉 party",
    ];

    fn allowed(c: char) -> bool {
        c.is_alphanumeric() || c == ' ' || ",.?!".contains(c)
    }

    #[test]
    fn test_clean_only_allowed_chars() {
        for s in SAMPLES {
            let cleaned = clean(s);
            assert!(cleaned.chars().all(allowed), "{:?} -> {:?}", s, cleaned);
            assert!(!cleaned.contains("  "), "{:?} -> {:?}", s, cleaned);
            assert_eq!(cleaned.trim(), cleaned);
        }
    }

    #[test]
    fn test_clean_examples() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("   "), "");
        assert_eq!(clean("Hello,   world!"), "Hello, world!");
        assert_eq!(clean("it's a test_case"), "its a testcase");
        assert_eq!(clean("line\none"), "line one");
        assert_eq!(clean("@@@"), "");
    }

    #[test]
    fn test_vocab_size() {
        assert_eq!(VOCAB_SIZE, 32);
    }

    #[test]
    fn test_encode_fixed_ids() {
        assert!(encode("").is_empty());
        assert_eq!(encode("a").ids(), &[1]);
        assert_eq!(encode("z").ids(), &[26]);
        assert_eq!(encode(" ,.?!").ids(), &[27, 28, 29, 30, 31]);
        assert_eq!(encode("A").ids(), encode("a").ids());
        assert_eq!(encode("9é").ids(), &[UNKNOWN_ID, UNKNOWN_ID]);
    }

    #[test]
    fn test_encode_one_id_per_char() {
        // 'İ' lower-cases to two chars, only the base letter is kept
        assert_eq!(encode("İ").ids(), &[9]);
        assert_eq!(encode("ABC").ids(), &[1, 2, 3]);
        for s in ["İstanbul", "Straße ΣΑΣ", "ﬁne"] {
            assert_eq!(encode(s).len(), s.chars().count(), "{}", s);
        }
    }

    #[test]
    fn test_encode_deterministic() {
        for s in SAMPLES {
            assert_eq!(encode(&clean(s)), encode(&clean(s)));
        }
    }

    #[test]
    fn test_decode_known_ids() {
        let tokens = encode("Hi there, 42!");
        assert_eq!(decode(&tokens), "hi there, !");
    }

    #[test]
    fn test_prepare_rejects_empty_and_long() {
        assert!(matches!(prepare(" #$% ", 512), Err(Error::InvalidInput(_))));
        assert!(matches!(prepare("abcdef", 5), Err(Error::InvalidInput(_))));
        assert_eq!(prepare("Hi!", 5).unwrap().ids(), &[8, 9, 31]);
    }
}
