//! Grading: deciding whether a turn's letters spell the target word.
//!
//! Grading itself is a pure predicate. The deterministic→generative
//! fallback chain is an explicit two-step strategy whose acceptance rule
//! is its own pure function, so the policy can be tested without any
//! model in the loop.

use crate::assistant::Assistant;
use crate::letters::{fuse, normalize_word, LetterCandidate, Provenance, Transcripts};

/// The grading verdict plus the letters ultimately credited to the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graded {
    pub correct: bool,
    /// Normalized spelling credited for this attempt.
    pub letters: String,
}

/// Primary check: the assembled letters spell the target. Fallback: the
/// recognizer transcribed the spoken word as itself — either an entire
/// source, or any single token inside one, normalizes to the target.
pub fn grade(target: &str, letters: &[char], sources: &Transcripts) -> Graded {
    let target_norm = normalize_word(target);
    let spelled: String = letters.iter().collect();
    let spelled_norm = normalize_word(&spelled);

    if spelled_norm == target_norm {
        return Graded {
            correct: true,
            letters: spelled_norm,
        };
    }

    for (_, source) in sources.in_priority_order() {
        let Some(source) = source else { continue };
        if normalize_word(source) == target_norm
            || source
                .split_whitespace()
                .any(|token| normalize_word(token) == target_norm)
        {
            return Graded {
                correct: true,
                letters: target_norm,
            };
        }
    }

    Graded {
        correct: false,
        letters: spelled_norm,
    }
}

/// Was the deterministic fusion result good enough to skip the model call?
pub fn needs_generative(target: &str, candidate: &LetterCandidate) -> bool {
    normalize_word(&candidate.joined()) != normalize_word(target)
}

/// Adopt the generative result only when it normalizes exactly to the
/// target, or carries strictly more letters than the deterministic parse
/// (more signal is preferred once determinism has already failed).
pub fn accept_generative(target: &str, deterministic: &[char], generative: &[char]) -> bool {
    let generative_norm: String = normalize_word(&generative.iter().collect::<String>());
    generative_norm == normalize_word(target) || generative.len() > deterministic.len()
}

/// The full letter-resolution strategy for one spelling attempt: fuse the
/// deterministic candidates, and only when they disagree with the target
/// ask the generative collaborator to re-derive the letters. Any transport
/// or parse failure leaves the deterministic result authoritative.
pub async fn resolve_letters<A: Assistant + ?Sized>(
    target: &str,
    sources: &Transcripts,
    assistant: &A,
) -> LetterCandidate {
    let fused = fuse(target, sources);
    if !needs_generative(target, &fused) {
        return fused;
    }

    match assistant.spell_from_transcript(&sources.combined()).await {
        Ok(extracted) if accept_generative(target, &fused.letters, &extracted.letters) => {
            LetterCandidate {
                letters: extracted.letters,
                provenance: Provenance::Generative,
            }
        }
        Ok(_) => fused,
        Err(e) => {
            tracing::warn!("generative letter extraction failed: {e:#}");
            fused
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{Confidence, ExtractedLetters, WordContext};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Returns a fixed letter sequence.
    struct SpellsOut(&'static str);

    /// Always errors; stands in for an unreachable endpoint.
    struct Unreachable;

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

    fn sources(browser: &str) -> Transcripts {
        Transcripts::new(Some(browser.to_string()), None)
    }

    #[test]
    fn assembled_letters_grade_correct() {
        let graded = grade("cat", &['c', 'a', 't'], &sources("c a t"));
        assert!(graded.correct);
        assert_eq!(graded.letters, "cat");
    }

    #[test]
    fn whole_word_source_grades_correct() {
        let graded = grade("cat", &['k', 'a', 't'], &sources("cat"));
        assert!(graded.correct);
        assert_eq!(graded.letters, "cat");
    }

    #[test]
    fn whole_word_token_inside_source_grades_correct() {
        let graded = grade("cat", &[], &sources("um the word is cat I think"));
        assert!(graded.correct);
        assert_eq!(graded.letters, "cat");
    }

    #[test]
    fn wrong_letters_grade_incorrect() {
        let graded = grade("cat", &['d', 'o', 'g'], &sources("d o g"));
        assert!(!graded.correct);
        assert_eq!(graded.letters, "dog");
    }

    #[test]
    fn matching_fusion_needs_no_model() {
        let candidate = LetterCandidate {
            letters: vec!['c', 'a', 't'],
            provenance: Provenance::Browser,
        };
        assert!(!needs_generative("cat", &candidate));
        assert!(needs_generative("dog", &candidate));
    }

    #[test]
    fn acceptance_policy() {
        // Exact match: accepted.
        assert!(accept_generative("cat", &['c'], &['c', 'a', 't']));
        // More letters than the deterministic parse: accepted.
        assert!(accept_generative("dog", &['d'], &['x', 'y']));
        // Neither: deterministic result stands.
        assert!(!accept_generative("cat", &['c', 'a'], &['x']));
    }

    #[tokio::test]
    async fn deterministic_match_skips_the_model() {
        // Unreachable would fail the turn if it were consulted.
        let resolved = resolve_letters("cat", &sources("c a t"), &Unreachable).await;
        assert_eq!(resolved.provenance, Provenance::Browser);
        assert_eq!(resolved.joined(), "cat");
    }

    #[tokio::test]
    async fn garbled_transcript_falls_back_to_the_model() {
        let resolved =
            resolve_letters("necessary", &sources("let e cessary"), &SpellsOut("necessary")).await;
        assert_eq!(resolved.provenance, Provenance::Generative);
        assert_eq!(resolved.joined(), "necessary");
    }

    #[tokio::test]
    async fn model_failure_keeps_the_deterministic_result() {
        let resolved = resolve_letters("necessary", &sources("let e cessary"), &Unreachable).await;
        // "let" decomposes, so the deterministic parse survives the outage.
        assert_eq!(resolved.provenance, Provenance::Browser);
        assert_eq!(resolved.joined(), "letecessary");
    }

    #[tokio::test]
    async fn unhelpful_model_output_is_rejected() {
        // Deterministic parse has 11 letters; the model returns fewer and
        // they don't match the target, so fusion stands.
        let resolved = resolve_letters("necessary", &sources("let e cessary"), &SpellsOut("nec")).await;
        assert_eq!(resolved.provenance, Provenance::Browser);
    }
}
