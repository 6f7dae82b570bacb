//! Guardrail intent classification.
//!
//! Every utterance is classified before any parsing or grading happens, so
//! off-task chatter never reaches the scoring path. Classification is pure
//! pattern matching over an ordered rule table; it makes no network calls
//! and never fails.

use crate::lexicon;

/// What the child is asking for this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Spelling,
    Definition,
    Sentence,
    Repeat,
    Skip,
    OffTopic,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Spelling => "spelling",
            Intent::Definition => "definition",
            Intent::Sentence => "sentence",
            Intent::Repeat => "repeat",
            Intent::Skip => "skip",
            Intent::OffTopic => "off_topic",
        }
    }
}

/// Classification result: the intent plus a redirect message for off-topic
/// turns (empty otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub message: String,
}

impl Classification {
    fn of(intent: Intent) -> Self {
        Self {
            intent,
            message: String::new(),
        }
    }

    fn off_topic(message: &str) -> Self {
        Self {
            intent: Intent::OffTopic,
            message: message.to_string(),
        }
    }
}

pub const OFF_TOPIC_REDIRECT: &str = "I can only help with spelling practice! \
Try spelling the word, or say 'repeat', 'definition', or 'skip'.";

pub const NOT_SPELLING_REDIRECT: &str = "That doesn't sound like spelling. \
Let's get back to it! Spell the word, or say 'repeat' or 'definition'.";

/// Allowed intents and their trigger phrases, checked in fixed priority
/// order: definition, sentence, repeat, skip. A `*` inside a phrase matches
/// any single word ("what does * mean").
const INTENT_RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Definition,
        &[
            "definition",
            "meaning",
            "what does it mean",
            "what does that mean",
            "what is that",
            "what's that mean",
            "explain",
            "what does * mean",
        ],
    ),
    (
        Intent::Sentence,
        &["use it in a sentence", "sentence", "example", "use the word"],
    ),
    (
        Intent::Repeat,
        &[
            "repeat",
            "say it again",
            "say that again",
            "one more time",
            "say the word",
            "what was the word",
            "again",
            "hear it again",
            "tell me the word",
        ],
    ),
    (
        Intent::Skip,
        &["skip", "next word", "move on", "pass", "skip this", "next one"],
    ),
];

/// Things a child might ask for that have nothing to do with spelling.
const OFF_TOPIC_TRIGGERS: &[&str] = &[
    "what are",
    "tell me",
    "who is",
    "where is",
    "how do",
    "can you",
    "do you know",
    "play",
    "watch",
    "netflix",
    "movie",
    "game",
    "song",
    "music",
    "youtube",
    "story",
    "joke",
    "weather",
    "time",
    "news",
    "search",
    "google",
    "hey siri",
    "alexa",
    "okay google",
    "what is the",
    "how old",
    "how many",
    "sing",
    "dance",
    "video",
    "cartoon",
    "pokemon",
    "minecraft",
    "roblox",
    "fortnite",
    "chat",
    "talk about",
    "help me with",
];

/// Utterances longer than this get the letter-likeness check.
const LONG_UTTERANCE_TOKENS: usize = 8;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '\'' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs as a contiguous word sequence in `tokens`.
/// A `*` phrase token matches any single word.
fn phrase_matches(tokens: &[String], phrase: &str) -> bool {
    let wanted: Vec<&str> = phrase.split_whitespace().collect();
    if wanted.is_empty() || wanted.len() > tokens.len() {
        return false;
    }
    tokens.windows(wanted.len()).any(|window| {
        window
            .iter()
            .zip(&wanted)
            .all(|(token, want)| *want == "*" || token == want)
    })
}

/// Classify a child's utterance into an allowed intent or off-topic.
///
/// Blank input defaults to `Spelling` ("still attempting"), as does
/// anything that matches no rule. Idempotent; total over any string.
pub fn classify(transcript: &str) -> Classification {
    if transcript.trim().is_empty() {
        return Classification::of(Intent::Spelling);
    }

    let tokens = tokenize(transcript);

    // Allowed intents first; order matters.
    for (intent, phrases) in INTENT_RULES {
        if phrases.iter().any(|p| phrase_matches(&tokens, p)) {
            return Classification::of(*intent);
        }
    }

    if OFF_TOPIC_TRIGGERS.iter().any(|p| phrase_matches(&tokens, p)) {
        return Classification::off_topic(OFF_TOPIC_REDIRECT);
    }

    // Long utterances that don't look like letter-by-letter spelling are
    // off-topic too.
    if tokens.len() > LONG_UTTERANCE_TOKENS {
        let letter_like = tokens.iter().filter(|t| lexicon::is_letter_like(t)).count();
        if letter_like * 2 < tokens.len() {
            return Classification::off_topic(NOT_SPELLING_REDIRECT);
        }
    }

    Classification::of(Intent::Spelling)
}
