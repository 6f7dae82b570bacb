//! The per-student drill session record.
//!
//! One `Session` exists per drill run and is the only mutable state the
//! engine owns. It is serialized as JSON into the session store; field
//! names match the wire format the gateway has always persisted.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::assistant::WordContext;
use crate::letters::normalize_word;

pub const DEFAULT_STUDENT_NAME: &str = "Student";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "default_student_name")]
    pub student_name: String,
    /// Normalized target words, fixed for the session's lifetime.
    pub words: Vec<String>,
    /// Current position; `0 <= idx <= words.len()`.
    pub idx: usize,
    /// Attempt counts per word index; entries only exist once attempted.
    #[serde(default)]
    pub attempts: HashMap<usize, u32>,
    pub score_correct: u32,
    pub score_total: u32,
    /// Words missed after the retry budget ran out. Append-only.
    #[serde(default)]
    pub wrong_words: Vec<String>,
    /// Words explicitly skipped. Append-only.
    #[serde(default)]
    pub skipped_words: Vec<String>,
    /// Lazily generated definition/sentence cache.
    #[serde(default)]
    pub word_context: HashMap<String, WordContext>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_round")]
    pub round: u32,
    pub created_ms: u64,
    pub last_active_ms: u64,
    /// Consecutive word-context failures. Transient; never persisted.
    #[serde(skip)]
    pub context_failures: u32,
}

fn default_student_name() -> String {
    DEFAULT_STUDENT_NAME.to_string()
}

fn default_round() -> u32 {
    1
}

impl Session {
    /// Create a fresh session over an already-normalized word list.
    pub fn new(words: Vec<String>, student_name: Option<String>, now: u64) -> Self {
        Self {
            student_name: student_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(default_student_name),
            words,
            idx: 0,
            attempts: HashMap::new(),
            score_correct: 0,
            score_total: 0,
            wrong_words: Vec::new(),
            skipped_words: Vec::new(),
            word_context: HashMap::new(),
            completed: false,
            round: 1,
            created_ms: now,
            last_active_ms: now,
            context_failures: 0,
        }
    }

    /// Normalize a raw word list the way session words are stored:
    /// lowercase a-z only, empties dropped.
    pub fn normalize_words(raw: &[String]) -> Vec<String> {
        raw.iter()
            .map(|w| normalize_word(w))
            .filter(|w| !w.is_empty())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.words.len()
    }

    /// The word currently being drilled, if the session is still running.
    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.idx).map(String::as_str)
    }

    pub fn attempts_for(&self, idx: usize) -> u32 {
        self.attempts.get(&idx).copied().unwrap_or(0)
    }

    /// Count one more graded attempt on the current word and return the
    /// new attempt total.
    pub fn record_attempt(&mut self) -> u32 {
        let entry = self.attempts.entry(self.idx).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Advance to the next word, marking completion when the list runs out.
    pub fn advance(&mut self) {
        self.idx += 1;
        if self.idx >= self.words.len() {
            self.completed = true;
        }
    }

    pub fn touch(&mut self, now: u64) {
        self.last_active_ms = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_zero() {
        let session = Session::new(vec!["cat".into(), "dog".into()], None, 42);
        assert_eq!(session.student_name, DEFAULT_STUDENT_NAME);
        assert_eq!(session.idx, 0);
        assert_eq!(session.score_correct, 0);
        assert_eq!(session.score_total, 0);
        assert!(!session.completed);
        assert_eq!(session.round, 1);
        assert_eq!(session.created_ms, 42);
        assert_eq!(session.current_word(), Some("cat"));
    }

    #[test]
    fn blank_student_name_falls_back_to_default() {
        let session = Session::new(vec!["cat".into()], Some("  ".into()), 0);
        assert_eq!(session.student_name, DEFAULT_STUDENT_NAME);
        let named = Session::new(vec!["cat".into()], Some("Maya".into()), 0);
        assert_eq!(named.student_name, "Maya");
    }

    #[test]
    fn normalize_words_drops_empties() {
        let raw = vec!["  Cat ".to_string(), "d-o-g".to_string(), "123".to_string()];
        assert_eq!(Session::normalize_words(&raw), vec!["cat", "dog"]);
    }

    #[test]
    fn advance_marks_completion_at_the_end() {
        let mut session = Session::new(vec!["cat".into()], None, 0);
        session.advance();
        assert_eq!(session.idx, 1);
        assert!(session.completed);
        assert_eq!(session.current_word(), None);
    }

    #[test]
    fn attempts_accumulate_per_index() {
        let mut session = Session::new(vec!["cat".into(), "dog".into()], None, 0);
        assert_eq!(session.record_attempt(), 1);
        assert_eq!(session.record_attempt(), 2);
        session.advance();
        assert_eq!(session.record_attempt(), 1);
        assert_eq!(session.attempts_for(0), 2);
        assert_eq!(session.attempts_for(1), 1);
    }

    #[test]
    fn serialization_round_trips_and_skips_transients() {
        let mut session = Session::new(vec!["cat".into()], Some("Maya".into()), 7);
        session.record_attempt();
        session.context_failures = 2;

        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("context_failures"));

        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.student_name, "Maya");
        assert_eq!(restored.attempts_for(0), 1);
        assert_eq!(restored.context_failures, 0);
    }
}
