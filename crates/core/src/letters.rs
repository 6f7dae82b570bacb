//! Deterministic letter parsing and multi-source transcript fusion.
//!
//! A child spelling out loud reaches the engine as one or two raw
//! transcripts (the browser's live transcript and the server-side
//! recognizer's output). Each is parsed into a letter candidate; fusion
//! picks the candidate whose length sits closest to the target word.

use serde::{Deserialize, Serialize};

use crate::lexicon;

/// Sentinel score for an empty candidate so it is never preferred over a
/// non-empty one.
const EMPTY_CANDIDATE_SCORE: usize = 9999;

/// Lowercase and strip everything outside `a-z`.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

/// Best-effort deterministic parsing: handles "c a t", "cee ay tee", NATO
/// code words, and recognizer output that fused letter sounds into a single
/// orthographic word. Total; never fails; returns only `a-z`.
pub fn parse_letters(transcript: &str) -> Vec<char> {
    let cleaned: String = transcript
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_whitespace() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut letters = Vec::new();
    for token in cleaned.split_whitespace() {
        if let Some(letter) = lexicon::nato_letter(token) {
            letters.push(letter);
        } else if let Some(letter) = lexicon::homophone_letter(token) {
            letters.push(letter);
        } else if token.chars().all(|c| c.is_ascii_lowercase()) {
            // A single character is taken literally. Longer unmapped
            // tokens are decomposed character by character: the recognizer
            // sometimes concatenates letter sounds into a word (child
            // spells N-E-C-E-S-S-A-R-Y, recognizer outputs "necessary").
            letters.extend(token.chars());
        }
        // Anything else (e.g. tokens still containing '-') is discarded.
    }
    letters
}

/// Which channel a letter candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Browser,
    Recognizer,
    Generative,
    None,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Browser => "browser",
            Provenance::Recognizer => "recognizer",
            Provenance::Generative => "generative",
            Provenance::None => "none",
        }
    }
}

/// The raw transcript sources available for one turn. Either may be absent;
/// the browser transcript has priority when both are present.
#[derive(Debug, Clone, Default)]
pub struct Transcripts {
    pub browser: Option<String>,
    pub recognizer: Option<String>,
}

impl Transcripts {
    pub fn new(browser: Option<String>, recognizer: Option<String>) -> Self {
        let non_blank = |s: Option<String>| s.filter(|t| !t.trim().is_empty());
        Self {
            browser: non_blank(browser),
            recognizer: non_blank(recognizer),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.browser.is_none() && self.recognizer.is_none()
    }

    /// The transcript used for intent classification and echoing back to
    /// the caller: browser first, recognizer otherwise.
    pub fn primary(&self) -> &str {
        self.browser
            .as_deref()
            .or(self.recognizer.as_deref())
            .unwrap_or("")
    }

    /// All non-empty sources joined for the generative fallback prompt.
    pub fn combined(&self) -> String {
        match (&self.browser, &self.recognizer) {
            (Some(b), Some(r)) => format!("{b} | {r}"),
            _ => self.primary().to_string(),
        }
    }

    /// Sources in fixed priority order for deterministic fusion.
    pub fn in_priority_order(&self) -> [(Provenance, Option<&str>); 2] {
        [
            (Provenance::Browser, self.browser.as_deref()),
            (Provenance::Recognizer, self.recognizer.as_deref()),
        ]
    }
}

/// An ordered letter sequence plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterCandidate {
    pub letters: Vec<char>,
    pub provenance: Provenance,
}

impl LetterCandidate {
    pub fn none() -> Self {
        Self {
            letters: Vec::new(),
            provenance: Provenance::None,
        }
    }

    pub fn joined(&self) -> String {
        self.letters.iter().collect()
    }
}

fn candidate_score(letters: &[char], target: &str) -> usize {
    if letters.is_empty() {
        EMPTY_CANDIDATE_SCORE
    } else {
        letters.len().abs_diff(target.len())
    }
}

/// Parse every available source and keep the candidate whose length is
/// closest to the target. Ties go to the earlier source (browser before
/// recognizer) so fusion stays deterministic. Both sources empty yields
/// `(empty, None)`; the caller rejects such turns as input-less.
pub fn fuse(target: &str, sources: &Transcripts) -> LetterCandidate {
    let mut best = LetterCandidate::none();
    let mut best_score = usize::MAX;

    for (provenance, text) in sources.in_priority_order() {
        let Some(text) = text else { continue };
        let letters = parse_letters(text);
        let score = candidate_score(&letters, target);
        if score < best_score {
            best = LetterCandidate { letters, provenance };
            best_score = score;
        }
    }
    best
}
