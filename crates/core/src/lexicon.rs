//! Static maps from spoken tokens to letters.
//!
//! Two vocabularies cover how children (and speech recognizers) render
//! letter sounds: the NATO phonetic alphabet and the much messier set of
//! letter-name homophones ("bee", "are", "double-u", ...). Both are pure
//! data with no runtime configuration.

use std::collections::HashMap;
use std::sync::LazyLock;

const NATO_WORDS: &[(&str, char)] = &[
    ("alpha", 'a'),
    ("bravo", 'b'),
    ("charlie", 'c'),
    ("delta", 'd'),
    ("echo", 'e'),
    ("foxtrot", 'f'),
    ("golf", 'g'),
    ("hotel", 'h'),
    ("india", 'i'),
    ("juliet", 'j'),
    ("kilo", 'k'),
    ("lima", 'l'),
    ("mike", 'm'),
    ("november", 'n'),
    ("oscar", 'o'),
    ("papa", 'p'),
    ("quebec", 'q'),
    ("romeo", 'r'),
    ("sierra", 's'),
    ("tango", 't'),
    ("uniform", 'u'),
    ("victor", 'v'),
    ("whiskey", 'w'),
    ("xray", 'x'),
    ("x-ray", 'x'),
    ("yankee", 'y'),
    ("zulu", 'z'),
];

const HOMOPHONE_WORDS: &[(&str, char)] = &[
    ("ay", 'a'),
    ("a", 'a'),
    ("aye", 'a'),
    ("hey", 'a'),
    ("bee", 'b'),
    ("be", 'b'),
    ("b", 'b'),
    ("cee", 'c'),
    ("see", 'c'),
    ("sea", 'c'),
    ("c", 'c'),
    ("dee", 'd'),
    ("d", 'd'),
    ("ee", 'e'),
    ("e", 'e'),
    ("he", 'e'),
    ("ef", 'f'),
    ("eff", 'f'),
    ("f", 'f'),
    ("gee", 'g'),
    ("g", 'g'),
    ("ji", 'g'),
    ("aitch", 'h'),
    ("h", 'h'),
    ("age", 'h'),
    ("each", 'h'),
    ("ach", 'h'),
    ("i", 'i'),
    ("eye", 'i'),
    ("jay", 'j'),
    ("j", 'j'),
    ("kay", 'k'),
    ("k", 'k'),
    ("okay", 'k'),
    ("el", 'l'),
    ("l", 'l'),
    ("ell", 'l'),
    ("elle", 'l'),
    ("em", 'm'),
    ("m", 'm'),
    ("en", 'n'),
    ("n", 'n'),
    ("and", 'n'),
    ("end", 'n'),
    ("oh", 'o'),
    ("o", 'o'),
    ("owe", 'o'),
    ("ow", 'o'),
    ("pee", 'p'),
    ("p", 'p'),
    ("pea", 'p'),
    ("cue", 'q'),
    ("queue", 'q'),
    ("q", 'q'),
    ("kew", 'q'),
    ("are", 'r'),
    ("r", 'r'),
    ("our", 'r'),
    ("ar", 'r'),
    ("ess", 's'),
    ("s", 's'),
    ("es", 's'),
    ("tee", 't'),
    ("t", 't'),
    ("tea", 't'),
    ("you", 'u'),
    ("u", 'u'),
    ("yew", 'u'),
    ("vee", 'v'),
    ("v", 'v'),
    ("ve", 'v'),
    ("doubleyou", 'w'),
    ("double-u", 'w'),
    ("doubleu", 'w'),
    ("w", 'w'),
    ("ex", 'x'),
    ("x", 'x'),
    ("why", 'y'),
    ("y", 'y'),
    ("wye", 'y'),
    ("zee", 'z'),
    ("zed", 'z'),
    ("z", 'z'),
];

static NATO: LazyLock<HashMap<&'static str, char>> =
    LazyLock::new(|| NATO_WORDS.iter().copied().collect());

static HOMOPHONES: LazyLock<HashMap<&'static str, char>> =
    LazyLock::new(|| HOMOPHONE_WORDS.iter().copied().collect());

/// Look up a token in the NATO phonetic alphabet.
pub fn nato_letter(token: &str) -> Option<char> {
    NATO.get(token).copied()
}

/// Look up a token among the letter-name homophones.
pub fn homophone_letter(token: &str) -> Option<char> {
    HOMOPHONES.get(token).copied()
}

/// Whether a token could plausibly be a spoken letter: short, or present in
/// either vocabulary. Used by the intent classifier to tell letter-by-letter
/// spelling apart from free-form chatter.
pub fn is_letter_like(token: &str) -> bool {
    token.len() <= 3 || NATO.contains_key(token) || HOMOPHONES.contains_key(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nato_covers_the_alphabet() {
        let mut letters: Vec<char> = NATO_WORDS.iter().map(|&(_, c)| c).collect();
        letters.sort_unstable();
        letters.dedup();
        assert_eq!(letters, ('a'..='z').collect::<Vec<_>>());
    }

    #[test]
    fn homophones_cover_the_alphabet() {
        let mut letters: Vec<char> = HOMOPHONE_WORDS.iter().map(|&(_, c)| c).collect();
        letters.sort_unstable();
        letters.dedup();
        assert_eq!(letters, ('a'..='z').collect::<Vec<_>>());
    }

    #[test]
    fn lookups_resolve_common_confusions() {
        assert_eq!(nato_letter("charlie"), Some('c'));
        assert_eq!(nato_letter("x-ray"), Some('x'));
        assert_eq!(homophone_letter("are"), Some('r'));
        assert_eq!(homophone_letter("and"), Some('n'));
        assert_eq!(homophone_letter("double-u"), Some('w'));
        assert_eq!(homophone_letter("zed"), Some('z'));
        assert_eq!(nato_letter("cat"), None);
        assert_eq!(homophone_letter("cat"), None);
    }

    #[test]
    fn letter_like_accepts_short_tokens_and_vocabulary_words() {
        assert!(is_letter_like("a"));
        assert!(is_letter_like("cat")); // length <= 3
        assert!(is_letter_like("november"));
        assert!(is_letter_like("doubleyou"));
        assert!(!is_letter_like("necessary"));
    }
}
