//! The generative-model collaborator.
//!
//! The `Assistant` trait is the narrow contract the engine uses to reach a
//! chat-completions endpoint: re-deriving letters when deterministic
//! parsing disagrees with the target, producing child-friendly word
//! context, generating practice word lists, and reading word lists out of
//! an uploaded image. The engine only ever depends on the trait, so tests
//! run against hand-written doubles with no network in the loop.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::extract::extract_json_object;
use crate::letters::normalize_word;
use crate::session::Session;

/// How sure the model says it is about an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn from_label(label: &str) -> Self {
        match label {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Letters recovered by the generative fallback.
#[derive(Debug, Clone)]
pub struct ExtractedLetters {
    pub letters: Vec<char>,
    pub confidence: Confidence,
}

/// Cached definition + example sentence for one word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordContext {
    pub definition: String,
    pub sentence: String,
}

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Re-derive the letters a child was trying to spell from a garbled
    /// transcript.
    async fn spell_from_transcript(&self, transcript: &str) -> Result<ExtractedLetters>;

    /// A child-friendly definition and example sentence for a word.
    async fn word_context(&self, word: &str) -> Result<WordContext>;

    /// Generate `count` age-appropriate practice words.
    async fn random_words(&self, count: usize) -> Result<Vec<String>>;

    /// Read a spelling list out of an uploaded image.
    async fn words_from_image(&self, image: &[u8], content_type: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Connection settings for the two chat endpoints (text and vision).
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub text_base_url: String,
    pub text_model: String,
    pub vision_base_url: String,
    pub vision_model: String,
    pub api_key: Option<String>,
    /// Client-wide request timeout; must stay below the transport timeout
    /// so a stuck model call degrades instead of failing the whole turn.
    pub timeout: Duration,
    /// Upper bound on the size of any extracted word list.
    pub max_words: usize,
}

/// `Assistant` backed by OpenAI-compatible `/chat/completions` endpoints.
pub struct AssistantClient {
    client: reqwest::Client,
    settings: AssistantSettings,
}

impl AssistantClient {
    pub fn new(settings: AssistantSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, settings }
    }

    async fn chat(
        &self,
        base_url: &str,
        model: &str,
        messages: serde_json::Value,
        temperature: f64,
        max_tokens: u32,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let url = format!("{base_url}/chat/completions");
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let key = self.settings.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("chat request to {url} failed"))?
            .error_for_status()
            .context("chat endpoint returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("chat response was not valid JSON")?;

        let content = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("chat endpoint returned no choices"))?
            .message
            .content
            .clone();
        Ok(content)
    }
}

const SPELLING_SYSTEM_PROMPT: &str = "You convert a child's spoken spelling into individual letters. \
The child is spelling a word one letter at a time, but speech recognition \
often garbles individual letters into words. For example:\n\
- 'let e cessary' means the child said N-E-C-E-S-S-A-R-Y\n\
- 'are a see e' means R-A-C-E\n\
- 'bee you tea full' means B-E-A-U-T-I-F-U-L\n\
- 'age a are em' means H-A-R-M\n\
Output only valid JSON. No markdown.";

fn spelling_user_prompt(transcript: &str) -> String {
    format!(
        "Extract the individual letters this child was trying to spell from the transcript.\n\
         The speech recognizer often converts letter sounds into words:\n\
         - Letter sounds like 'en' or 'and' may mean N\n\
         - 'are' or 'our' may mean R\n\
         - 'see' or 'sea' may mean C\n\
         - 'double you' or 'dub' may mean W\n\
         - 'why' may mean Y\n\
         - 'age' or 'each' may mean H\n\
         - 'eye' may mean I\n\
         - 'oh' may mean O\n\
         - 'you' may mean U\n\
         - 'be' or 'bee' may mean B\n\
         Rules:\n\
         - Output JSON only: {{\"letters\":[\"a\",\"b\"],\"confidence\":\"high|medium|low\"}}\n\
         - letters must be a-z only\n\
         - If the transcript contains a complete word (not spelled letters), try to extract \
         the individual letters the child likely said\n\
         Transcript: {transcript:?}\n"
    )
}

const CONTEXT_SYSTEM_PROMPT: &str = "You are a helpful spelling bee pronouncer for a 9-year-old child. \
Given a word, you MUST provide a real, child-friendly definition and an example sentence.\n\
Rules:\n\
- The definition should be one short sentence a child can understand.\n\
- The example sentence should use the word naturally.\n\
- Do NOT say 'a spelling word' — always give a real definition.\n\
- Output JSON only: {\"definition\":\"...\",\"sentence\":\"...\"}\n\
- No markdown, no extra keys, no commentary.\n";

fn random_words_system_prompt(count: usize) -> String {
    format!(
        "You are a spelling bee word generator for a 9-year-old child. \
         Generate exactly {count} unique English words suitable for a 3rd-5th grade spelling bee. \
         Rules:\n\
         - Mix easy, medium, and hard words.\n\
         - Include a variety of word types and topics.\n\
         - No offensive, violent, or inappropriate words.\n\
         - Each word should be a single word (no spaces, no hyphens).\n\
         - Output a JSON object only: {{\"words\":[\"word1\",\"word2\",...]}}\n\
         - No markdown, no extra keys, no commentary.\n"
    )
}

const IMAGE_SYSTEM_PROMPT: &str =
    "You extract spelling words from images. Output only valid JSON. No markdown.";

const IMAGE_USER_PROMPT: &str = "Extract the spelling list from this image.\n\
Return JSON only in the form: {\"words\":[...]}\n\
Rules:\n\
- words only, lowercase\n\
- remove numbering/bullets/punctuation\n\
- split combined lines into separate words\n\
- no extra keys, no commentary\n";

/// Drop duplicates and non-words, normalize, and cap the list length.
fn clean_word_list(raw: &[serde_json::Value], max_words: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in raw {
        let Some(word) = value.as_str() else { continue };
        let word = normalize_word(word);
        if !word.is_empty() && seen.insert(word.clone()) {
            out.push(word);
        }
        if out.len() >= max_words {
            break;
        }
    }
    out
}

#[async_trait]
impl Assistant for AssistantClient {
    async fn spell_from_transcript(&self, transcript: &str) -> Result<ExtractedLetters> {
        let messages = json!([
            { "role": "system", "content": SPELLING_SYSTEM_PROMPT },
            { "role": "user", "content": spelling_user_prompt(transcript) },
        ]);
        let content = self
            .chat(
                &self.settings.text_base_url,
                &self.settings.text_model,
                messages,
                0.0,
                200,
                None,
            )
            .await?;

        let object =
            extract_json_object(&content).ok_or_else(|| anyhow!("no JSON object in: {content}"))?;

        let mut letters = Vec::new();
        if let Some(raw) = object.get("letters").and_then(|v| v.as_array()) {
            for value in raw {
                if let Some(s) = value.as_str() {
                    let s = s.trim().to_lowercase();
                    let mut chars = s.chars();
                    if let (Some(c), None) = (chars.next(), chars.next()) {
                        if c.is_ascii_lowercase() {
                            letters.push(c);
                        }
                    }
                }
            }
        }
        let confidence = object
            .get("confidence")
            .and_then(|v| v.as_str())
            .map(Confidence::from_label)
            .unwrap_or(Confidence::Low);

        Ok(ExtractedLetters { letters, confidence })
    }

    async fn word_context(&self, word: &str) -> Result<WordContext> {
        let messages = json!([
            { "role": "system", "content": CONTEXT_SYSTEM_PROMPT },
            { "role": "user", "content": format!(
                "Give me a simple definition and example sentence for the word \"{word}\".") },
        ]);
        let content = self
            .chat(
                &self.settings.text_base_url,
                &self.settings.text_model,
                messages,
                0.3,
                150,
                Some(Duration::from_secs(8)),
            )
            .await?;

        let object = extract_json_object(&content).unwrap_or_default();
        let mut definition = object
            .get("definition")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let sentence = object
            .get("sentence")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        // Placeholder answers are worse than nothing; treat them as absent.
        let lowered = definition.to_lowercase();
        if matches!(
            lowered.as_str(),
            "" | "a spelling word" | "a spelling word." | "it is a spelling word."
        ) {
            definition = String::new();
        }

        Ok(WordContext { definition, sentence })
    }

    async fn random_words(&self, count: usize) -> Result<Vec<String>> {
        // Nudge the sampler with a varying seed; the model is already at a
        // high temperature, this just defeats response caching.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() % 100_000)
            .unwrap_or(0);
        let messages = json!([
            { "role": "system", "content": random_words_system_prompt(count) },
            { "role": "user", "content": format!(
                "Generate {count} random spelling bee words. Use seed {seed} for variety.") },
        ]);
        let content = self
            .chat(
                &self.settings.text_base_url,
                &self.settings.text_model,
                messages,
                0.9,
                300,
                Some(Duration::from_secs(10)),
            )
            .await?;

        let object =
            extract_json_object(&content).ok_or_else(|| anyhow!("no JSON object in: {content}"))?;
        let words = object
            .get("words")
            .and_then(|v| v.as_array())
            .map(|raw| clean_word_list(raw, count))
            .unwrap_or_default();
        if words.len() < 5 {
            return Err(anyhow!("model returned too few valid words: {words:?}"));
        }
        Ok(words)
    }

    async fn words_from_image(&self, image: &[u8], content_type: &str) -> Result<Vec<String>> {
        let content_type = if content_type.is_empty() {
            "image/png"
        } else {
            content_type
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{content_type};base64,{encoded}");
        let messages = json!([
            { "role": "system", "content": IMAGE_SYSTEM_PROMPT },
            { "role": "user", "content": [
                { "type": "text", "text": IMAGE_USER_PROMPT },
                { "type": "image_url", "image_url": { "url": data_url } },
            ]},
        ]);

        // The vision model occasionally returns unusable output; one retry
        // covers the common flake.
        let mut last_err = None;
        for attempt in 0..2 {
            let content = match self
                .chat(
                    &self.settings.vision_base_url,
                    &self.settings.vision_model,
                    messages.clone(),
                    0.0,
                    800,
                    None,
                )
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("vision extraction attempt {} failed: {e:#}", attempt + 1);
                    last_err = Some(e);
                    continue;
                }
            };

            if let Some(object) = extract_json_object(&content) {
                if let Some(raw) = object.get("words").and_then(|v| v.as_array()) {
                    let words = clean_word_list(raw, self.settings.max_words);
                    if !words.is_empty() {
                        return Ok(words);
                    }
                }
            }
            tracing::warn!("no words parsed from vision response, attempt {}", attempt + 1);
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Give up on context generation after this many consecutive failures so a
/// dead model endpoint doesn't add a timeout to every prompt.
const CONTEXT_FAILURE_LIMIT: u32 = 3;

/// Look up (or lazily generate and cache) the definition and example
/// sentence for a word. Only real definitions are cached, so transient
/// failures stay retryable.
pub async fn context_for_word<A: Assistant + ?Sized>(
    session: &mut Session,
    word: &str,
    assistant: &A,
) -> WordContext {
    if let Some(cached) = session.word_context.get(word) {
        return cached.clone();
    }
    if session.context_failures >= CONTEXT_FAILURE_LIMIT {
        return WordContext::default();
    }

    match assistant.word_context(word).await {
        Ok(context) => {
            if !context.definition.is_empty() {
                session.context_failures = 0;
                session
                    .word_context
                    .insert(word.to_string(), context.clone());
            }
            context
        }
        Err(e) => {
            tracing::warn!("word context generation failed for '{word}': {e:#}");
            session.context_failures += 1;
            WordContext::default()
        }
    }
}
