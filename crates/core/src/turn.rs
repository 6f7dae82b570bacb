//! The turn state machine: one answer submission in, one outcome out.
//!
//! A turn is classified, resolved into letters, graded, and folded into
//! the session — attempts, retries, score, wrong/skipped lists, and
//! completion. The engine never touches the store; callers persist the
//! session before responding.

use thiserror::Error;

use crate::assistant::Assistant;
use crate::grade;
use crate::intent::{self, Intent};
use crate::letters::{Provenance, Transcripts};
use crate::session::Session;

/// Extra attempts allowed on a word before it is revealed and the session
/// moves on.
pub const DEFAULT_RETRY_BUDGET: u32 = 1;

#[derive(Debug, Error)]
pub enum TurnError {
    /// Neither a transcript nor transcribed audio reached the engine.
    #[error("provide a transcript or audio")]
    NoInput,
}

/// Everything the caller needs to answer one turn submission.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Index the turn was played at.
    pub idx: usize,
    /// Target word for that index (empty once the session is over).
    pub word: String,
    /// Human-readable echo of what was heard, tagged with its source.
    pub transcript: String,
    /// Normalized letters credited for the attempt.
    pub letters: String,
    pub correct: bool,
    pub attempts_for_word: u32,
    pub feedback: String,
    pub next_idx: usize,
    pub done: bool,
    pub score_correct: u32,
    pub score_total: u32,
    /// Missed words; populated once the session completes.
    pub wrong_words: Vec<String>,
    /// True when the turn was a guardrail redirect, not a graded attempt.
    pub is_guardrail: bool,
}

pub struct TurnEngine {
    pub retry_budget: u32,
}

impl Default for TurnEngine {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl TurnEngine {
    pub fn new(retry_budget: u32) -> Self {
        Self { retry_budget }
    }

    /// Resolve one answer submission against the session.
    ///
    /// Completed sessions get a fixed terminal outcome with no mutation.
    /// Otherwise the transcript is classified and dispatched: skip turns
    /// advance without scoring, guardrail turns redirect without scoring,
    /// and spelling turns run fusion → fallback → grading and update
    /// attempts, score, and position.
    pub async fn resolve<A: Assistant + ?Sized>(
        &self,
        session: &mut Session,
        sources: &Transcripts,
        assistant: &A,
        now: u64,
    ) -> Result<TurnOutcome, TurnError> {
        let Some(target) = session.current_word().map(str::to_string) else {
            return Ok(Self::already_done(session));
        };
        if sources.is_empty() {
            return Err(TurnError::NoInput);
        }

        let classification = intent::classify(sources.primary());
        match classification.intent {
            Intent::OffTopic => {
                session.touch(now);
                Ok(self.guardrail(session, &target, sources, classification.message))
            }
            Intent::Definition | Intent::Sentence | Intent::Repeat => {
                // The client normally handles these before submitting; if
                // one reaches the engine anyway it must not be graded.
                session.touch(now);
                let hint = match classification.intent {
                    Intent::Repeat => "Tap the speaker icon to hear the word again.",
                    _ => "Use the definition button or say it during listening.",
                };
                Ok(self.guardrail(session, &target, sources, hint.to_string()))
            }
            Intent::Skip => Ok(self.skip(session, &target, sources, now)),
            Intent::Spelling => Ok(self.spell(session, &target, sources, assistant, now).await),
        }
    }

    fn already_done(session: &Session) -> TurnOutcome {
        TurnOutcome {
            idx: session.idx,
            word: String::new(),
            transcript: String::new(),
            letters: String::new(),
            correct: true,
            attempts_for_word: 0,
            feedback: "All done!".to_string(),
            next_idx: session.idx,
            done: true,
            score_correct: session.score_correct,
            score_total: session.score_total,
            wrong_words: session.wrong_words.clone(),
            is_guardrail: false,
        }
    }

    fn guardrail(
        &self,
        session: &Session,
        target: &str,
        sources: &Transcripts,
        message: String,
    ) -> TurnOutcome {
        TurnOutcome {
            idx: session.idx,
            word: target.to_string(),
            transcript: sources.primary().to_string(),
            letters: String::new(),
            correct: false,
            attempts_for_word: session.attempts_for(session.idx),
            feedback: message,
            next_idx: session.idx,
            done: false,
            score_correct: session.score_correct,
            score_total: session.score_total,
            wrong_words: Vec::new(),
            is_guardrail: true,
        }
    }

    fn skip(
        &self,
        session: &mut Session,
        target: &str,
        sources: &Transcripts,
        now: u64,
    ) -> TurnOutcome {
        let idx = session.idx;
        session.skipped_words.push(target.to_string());
        session.advance();
        session.touch(now);
        let done = session.completed;

        TurnOutcome {
            idx,
            word: target.to_string(),
            transcript: sources.primary().to_string(),
            letters: String::new(),
            correct: false,
            attempts_for_word: 0,
            feedback: format!(
                "Skipping {target}. {}",
                if done { "You're all done!" } else { "Next word." }
            ),
            next_idx: session.idx,
            done,
            score_correct: session.score_correct,
            score_total: session.score_total,
            wrong_words: if done {
                session.wrong_words.clone()
            } else {
                Vec::new()
            },
            is_guardrail: false,
        }
    }

    async fn spell<A: Assistant + ?Sized>(
        &self,
        session: &mut Session,
        target: &str,
        sources: &Transcripts,
        assistant: &A,
        now: u64,
    ) -> TurnOutcome {
        let idx = session.idx;
        let candidate = grade::resolve_letters(target, sources, assistant).await;
        let graded = grade::grade(target, &candidate.letters, sources);

        let attempts = session.record_attempt();
        session.score_total += 1;

        let total = session.total();
        let feedback;
        if graded.correct {
            session.score_correct += 1;
            session.advance();
            feedback = if session.completed {
                format!("Great job! You finished all {total} words.")
            } else {
                format!("Nice! {target} is correct. Next word.")
            };
        } else if attempts <= self.retry_budget {
            feedback = "Not quite. Try again.".to_string();
        } else {
            let reveal = target
                .chars()
                .map(String::from)
                .collect::<Vec<_>>()
                .join(" ... ");
            session.wrong_words.push(target.to_string());
            session.advance();
            feedback = if session.completed {
                format!("Not quite. The correct spelling was {reveal}. ... You're done for today!")
            } else {
                format!("Not quite. The correct spelling is {reveal}. ... Next word.")
            };
        }
        session.touch(now);
        let done = session.completed;

        TurnOutcome {
            idx,
            word: target.to_string(),
            transcript: describe_transcript(sources, candidate.provenance),
            letters: graded.letters,
            correct: graded.correct,
            attempts_for_word: attempts,
            feedback,
            next_idx: session.idx,
            done,
            score_correct: session.score_correct,
            score_total: session.score_total,
            wrong_words: if done {
                session.wrong_words.clone()
            } else {
                Vec::new()
            },
            is_guardrail: false,
        }
    }
}

/// Echo what was heard, tagged with the channel the credited letters came
/// from when it isn't obvious.
fn describe_transcript(sources: &Transcripts, provenance: Provenance) -> String {
    match (&sources.browser, &sources.recognizer) {
        (Some(browser), Some(recognizer)) => {
            format!(
                "[{}] browser={browser:?} recognizer={recognizer:?}",
                provenance.as_str()
            )
        }
        _ if provenance == Provenance::Generative => {
            format!("{} [generative]", sources.primary())
        }
        _ => sources.primary().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{Confidence, ExtractedLetters, WordContext};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Stands in for an unreachable model endpoint; the deterministic path
    /// must never depend on it.
    struct Unreachable;

    #[async_trait]
    impl Assistant for Unreachable {
        async fn spell_from_transcript(&self, _transcript: &str) -> Result<ExtractedLetters> {
            Err(anyhow!("connection refused"))
        }
        async fn word_context(&self, _word: &str) -> Result<WordContext> {
            Err(anyhow!("connection refused"))
        }
        async fn random_words(&self, _count: usize) -> Result<Vec<String>> {
            Err(anyhow!("connection refused"))
        }
        async fn words_from_image(&self, _image: &[u8], _ct: &str) -> Result<Vec<String>> {
            Err(anyhow!("connection refused"))
        }
    }

    /// Returns a fixed letter sequence from any transcript.
    struct SpellsOut(&'static str);

    #[async_trait]
    impl Assistant for SpellsOut {
        async fn spell_from_transcript(&self, _transcript: &str) -> Result<ExtractedLetters> {
            Ok(ExtractedLetters {
                letters: self.0.chars().collect(),
                confidence: Confidence::High,
            })
        }
        async fn word_context(&self, _word: &str) -> Result<WordContext> {
            Ok(WordContext::default())
        }
        async fn random_words(&self, _count: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn words_from_image(&self, _image: &[u8], _ct: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn drill(words: &[&str]) -> Session {
        Session::new(words.iter().map(|w| w.to_string()).collect(), None, 0)
    }

    fn spoken(text: &str) -> Transcripts {
        Transcripts::new(Some(text.to_string()), None)
    }

    fn spelled_out(word: &str) -> Transcripts {
        let letters: Vec<String> = word.chars().map(String::from).collect();
        spoken(&letters.join(" "))
    }

    #[tokio::test]
    async fn all_correct_turns_complete_the_session() {
        let engine = TurnEngine::default();
        let words = ["cat", "dog", "bird"];
        let mut session = drill(&words);

        for (i, word) in words.iter().enumerate() {
            let outcome = engine
                .resolve(&mut session, &spelled_out(word), &Unreachable, 10)
                .await
                .unwrap();
            assert!(outcome.correct, "turn {i} should grade correct");
            assert_eq!(outcome.attempts_for_word, 1);
            assert_eq!(outcome.next_idx, i + 1);
        }

        assert!(session.completed);
        assert_eq!(session.score_correct, 3);
        assert_eq!(session.score_total, 3);
        assert_eq!(session.last_active_ms, 10);
    }

    #[tokio::test]
    async fn skip_advances_without_scoring() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat", "dog"]);

        let outcome = engine
            .resolve(&mut session, &spoken("skip this one"), &Unreachable, 5)
            .await
            .unwrap();

        assert!(!outcome.correct);
        assert!(!outcome.is_guardrail);
        assert_eq!(outcome.next_idx, 1);
        assert_eq!(session.skipped_words, vec!["cat"]);
        assert_eq!(session.score_total, 0);
        assert_eq!(session.score_correct, 0);
        assert!(session.attempts.is_empty());
        assert!(!session.completed);
    }

    #[tokio::test]
    async fn retry_budget_gives_one_retry_then_reveals() {
        let engine = TurnEngine::new(1);
        let mut session = drill(&["cat", "dog"]);

        let first = engine
            .resolve(&mut session, &spelled_out("dog"), &SpellsOut("dog"), 1)
            .await
            .unwrap();
        assert!(!first.correct);
        assert_eq!(first.feedback, "Not quite. Try again.");
        assert_eq!(first.next_idx, 0);
        assert_eq!(first.attempts_for_word, 1);
        assert!(session.wrong_words.is_empty());

        let second = engine
            .resolve(&mut session, &spelled_out("dog"), &SpellsOut("dog"), 2)
            .await
            .unwrap();
        assert!(!second.correct);
        assert_eq!(second.attempts_for_word, 2);
        assert_eq!(second.next_idx, 1);
        assert!(second.feedback.contains("c ... a ... t"));
        assert_eq!(session.wrong_words, vec!["cat"]);
        assert_eq!(session.score_total, 2);
        assert_eq!(session.score_correct, 0);
    }

    #[tokio::test]
    async fn off_topic_turns_do_not_score() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat"]);

        let outcome = engine
            .resolve(&mut session, &spoken("can you play a song"), &Unreachable, 9)
            .await
            .unwrap();

        assert!(outcome.is_guardrail);
        assert!(!outcome.correct);
        assert_eq!(outcome.feedback, intent::OFF_TOPIC_REDIRECT);
        assert_eq!(outcome.next_idx, 0);
        assert_eq!(session.score_total, 0);
        assert!(session.attempts.is_empty());
        assert_eq!(session.last_active_ms, 9);
    }

    #[tokio::test]
    async fn meta_intents_reaching_the_engine_redirect() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat"]);

        let outcome = engine
            .resolve(&mut session, &spoken("say it again"), &Unreachable, 3)
            .await
            .unwrap();

        assert!(outcome.is_guardrail);
        assert_eq!(outcome.feedback, "Tap the speaker icon to hear the word again.");
        assert_eq!(session.score_total, 0);
        assert_eq!(session.idx, 0);
    }

    #[tokio::test]
    async fn garbled_spelling_recovers_through_the_model() {
        let engine = TurnEngine::default();
        let mut session = drill(&["necessary"]);

        let outcome = engine
            .resolve(
                &mut session,
                &spoken("let e cessary"),
                &SpellsOut("necessary"),
                4,
            )
            .await
            .unwrap();

        assert!(outcome.correct);
        assert_eq!(outcome.letters, "necessary");
        assert!(outcome.transcript.contains("[generative]"));
        assert!(outcome.done);
        assert_eq!(session.score_correct, 1);
    }

    #[tokio::test]
    async fn whole_word_recognition_grades_correct() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat", "dog"]);

        // The recognizer heard the word itself instead of letters; the
        // model is down, and the turn still grades correct.
        let outcome = engine
            .resolve(&mut session, &spoken("cat"), &Unreachable, 4)
            .await
            .unwrap();

        assert!(outcome.correct);
        assert_eq!(outcome.letters, "cat");
    }

    #[tokio::test]
    async fn completed_sessions_are_terminal() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat"]);
        engine
            .resolve(&mut session, &spelled_out("cat"), &Unreachable, 1)
            .await
            .unwrap();
        assert!(session.completed);

        let before = session.clone();
        let outcome = engine
            .resolve(&mut session, &spelled_out("cat"), &Unreachable, 2)
            .await
            .unwrap();

        assert!(outcome.done);
        assert_eq!(outcome.feedback, "All done!");
        assert_eq!(session.score_total, before.score_total);
        assert_eq!(session.attempts, before.attempts);
        assert_eq!(session.last_active_ms, before.last_active_ms);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_mutation() {
        let engine = TurnEngine::default();
        let mut session = drill(&["cat"]);

        let result = engine
            .resolve(&mut session, &Transcripts::default(), &Unreachable, 7)
            .await;

        assert!(matches!(result, Err(TurnError::NoInput)));
        assert_eq!(session.score_total, 0);
        assert_eq!(session.last_active_ms, 0);
    }

    #[tokio::test]
    async fn wrong_words_are_reported_on_completion() {
        let engine = TurnEngine::new(0);
        let mut session = drill(&["cat"]);

        let outcome = engine
            .resolve(&mut session, &spelled_out("dog"), &SpellsOut("dog"), 1)
            .await
            .unwrap();

        assert!(outcome.done);
        assert_eq!(outcome.wrong_words, vec!["cat"]);
        assert!(outcome.feedback.contains("You're done for today!"));
    }
}
