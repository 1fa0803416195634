//! Radio calls: turns the math results into a short message for the driver
//! using an external text model, bounded by a hard latency budget.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::types::{ChaosEvent, MathResults};

pub const TIMEOUT_FALLBACK: &str = "Copy that, we are crunching the numbers. Stay out for now.";
pub const ERROR_FALLBACK: &str = "Box box box! We have a strategy error, come in now!";
pub const NO_KEY_FALLBACK: &str = "Gemini API key not found. Simulated Radio: Box box box!";

pub const DEFAULT_BUDGET: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream returned no text")]
    Empty,
}

/// External text generation. The returned future is spawned onto its own
/// task, so it must own everything it needs.
pub trait RadioModel: Send + Sync {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, RadioError>>;
}

pub fn build_prompt(results: &MathResults, event: &ChaosEvent) -> String {
    let numbers = serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string());
    if event.is_routine() {
        format!(
            "You are a calm, measured F1 Race Engineer giving a routine strategy update.\n\
             \n\
             Here is the output from our strategy Monte Carlo simulator:\n\
             {numbers}\n\
             \n\
             Based ONLY on this info, generate exactly a 2-sentence radio call to the driver.\n\
             Keep it composed. Include the specific recommendation and win probability."
        )
    } else {
        format!(
            "You are a highly stressed F1 Race Engineer.\n\
             A sudden '{event}' event has occurred.\n\
             \n\
             Here is the output from our strategy Monte Carlo simulator:\n\
             {numbers}\n\
             \n\
             Based ONLY on this info, generate exactly a 3-sentence radio call to the driver.\n\
             Keep it panicked but professional. Include the specific recommendation and win probability."
        )
    }
}

/// Issues one radio request per event and never waits past `budget`.
#[derive(Clone)]
pub struct RadioEngineer {
    model: Option<Arc<dyn RadioModel>>,
    budget: Duration,
}

impl RadioEngineer {
    pub fn new(model: Arc<dyn RadioModel>, budget: Duration) -> Self {
        Self {
            model: Some(model),
            budget,
        }
    }

    /// No upstream configured: every call returns [`NO_KEY_FALLBACK`].
    pub fn offline() -> Self {
        Self {
            model: None,
            budget: DEFAULT_BUDGET,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// The request runs on a spawned task raced against the budget. On
    /// timeout the task is left running and its result is dropped when it
    /// eventually lands.
    pub async fn radio_call(&self, results: &MathResults, event: &ChaosEvent) -> String {
        let Some(model) = &self.model else {
            return NO_KEY_FALLBACK.to_string();
        };

        let prompt = build_prompt(results, event);
        let handle = tokio::spawn(model.generate(prompt));

        match tokio::time::timeout(self.budget, handle).await {
            Ok(Ok(Ok(text))) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::warn!(event = %event, "radio model returned empty text");
                    ERROR_FALLBACK.to_string()
                } else {
                    text.to_string()
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(event = %event, "radio model error: {}", e);
                ERROR_FALLBACK.to_string()
            }
            Ok(Err(e)) => {
                tracing::error!(event = %event, "radio task failed: {}", e);
                ERROR_FALLBACK.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    event = %event,
                    budget_ms = self.budget.as_millis() as u64,
                    "radio model timeout"
                );
                TIMEOUT_FALLBACK.to_string()
            }
        }
    }
}

// ---------- Gemini ----------

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            // Bounds how long an abandoned call can linger after the budget.
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl RadioModel for GeminiClient {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, RadioError>> {
        let http = self.http.clone();
        let url = self.endpoint();
        let key = self.api_key.clone();
        Box::pin(async move {
            let resp = http
                .post(url)
                .query(&[("key", key.as_str())])
                .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(RadioError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let out: GenerateResponse = resp.json().await?;
            extract_text(out).ok_or(RadioError::Empty)
        })
    }
}

fn extract_text(resp: GenerateResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
