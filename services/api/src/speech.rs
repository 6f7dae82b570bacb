//! Speech-to-text collaborator.
//!
//! The engine consumes transcription output, never its implementation, so
//! the service talks to an external recognizer through this one-method
//! trait. The concrete client posts the uploaded audio to an
//! ElevenLabs-style `/v1/speech-to-text` endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one uploaded audio clip into text.
    async fn transcribe(&self, audio: Vec<u8>, filename: String) -> Result<String>;
}

pub struct ScribeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ScribeClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl Transcriber for ScribeClient {
    async fn transcribe(&self, audio: Vec<u8>, filename: String) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model_id", "scribe_v2")
            .text("language_code", "en");

        let url = format!("{}/v1/speech-to-text", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("speech-to-text request to {url} failed"))?
            .error_for_status()
            .context("speech-to-text endpoint returned an error status")?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("speech-to-text response was not valid JSON")?;
        Ok(body
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}
