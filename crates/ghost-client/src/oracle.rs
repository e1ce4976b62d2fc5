use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use ghost_core::AssistantBridge;
use ghost_core::assistant::FAILURE_SENTINEL;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Tried in order until one answers.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
];

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// All text parts of all candidates, concatenated.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect()
    }
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

/// The assistant, reached over the Gemini HTTP API or not at all.
pub enum Oracle {
    Gemini {
        client: Client,
        api_key: String,
        models: Vec<String>,
    },
    Offline,
}

impl Oracle {
    pub fn gemini(api_key: String, models: Vec<String>) -> Self {
        let models = if models.is_empty() {
            DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
        } else {
            models
        };
        Self::Gemini {
            client: Client::new(),
            api_key,
            models,
        }
    }
}

async fn generate(client: &Client, api_key: &str, model: &str, prompt: &str) -> anyhow::Result<String> {
    let resp = client
        .post(format!("{}/models/{}:generateContent", API_BASE, model))
        .query(&[("key", api_key)])
        .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("({}) {}", status, body.lines().next().unwrap_or_default());
    }

    let text = resp.json::<GenerateResponse>().await?.text();
    if text.trim().is_empty() {
        anyhow::bail!("empty reply");
    }
    Ok(text)
}

impl AssistantBridge for Oracle {
    async fn ask(&self, prompt: String) -> String {
        let Self::Gemini {
            client,
            api_key,
            models,
        } = self
        else {
            return format!("{}\n[offline: set GHOST_GEMINI_API_KEY]", FAILURE_SENTINEL);
        };

        let mut report = String::new();
        for model in models {
            match generate(client, api_key, model, &prompt).await {
                Ok(reply) => {
                    info!(model = %model, "oracle answered");
                    return reply;
                }
                Err(e) => {
                    warn!(model = %model, "oracle call failed: {}", e);
                    report.push_str(&format!("[{}: {}] ", model, e));
                }
            }
        }
        format!("{}\n{}", FAILURE_SENTINEL, report.trim_end())
    }
}
