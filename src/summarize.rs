// src/summarize.rs
//! Short AI summaries for `/summarize`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROMPT: &str = "Summarize the following article in 2-5 concise sentences for a general \
audience, focusing on the main outcome. Format with line breaks. Omit links, references, and \
introductory phrases.\n\nArticle:\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub model: String,
}

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<Summary>;
}

/// Google Gemini `generateContent` over REST.
#[derive(Clone)]
pub struct GeminiSummarizer {
    client: Client,
    base: String,
    api_key: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build gemini client")?;
        Ok(Self {
            client,
            base: GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: GEMINI_MODEL.to_string(),
        })
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[async_trait::async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary> {
        if text.trim().is_empty() {
            bail!("cannot summarize empty text");
        }
        let t0 = std::time::Instant::now();
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{PROMPT}{text}") }] }]
        });
        let resp: GenerateResponse = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("gemini request")?
            .error_for_status()
            .context("gemini non-2xx")?
            .json()
            .await
            .context("gemini decode")?;
        let summary = resp
            .text()
            .ok_or_else(|| anyhow!("gemini returned no text"))?;
        tracing::info!(
            target: "summarize",
            event = "summary_generated",
            model = %self.model,
            duration_ms = t0.elapsed().as_millis() as u64,
        );
        Ok(Summary {
            summary,
            model: self.model.clone(),
        })
    }
}

/// Wired when `GEMINI_API_KEY` is absent; every call fails.
pub struct DisabledSummarizer;

#[async_trait::async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _text: &str) -> Result<Summary> {
        Err(anyhow!("summarizer disabled (no GEMINI_API_KEY)"))
    }
}
