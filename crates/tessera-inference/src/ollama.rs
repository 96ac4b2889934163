//! Text generation through a local Ollama server.
//!
//! Only the `/api/chat` endpoint is used. For JSON requests the backend
//! sends `format: "json"` and `think: false` so thinking models return the
//! document alone.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use tessera_core::defaults::{GEN_MODEL, GEN_TIMEOUT_SECS, OLLAMA_URL};
use tessera_core::{Error, GenerationBackend, Result};

const TAGS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Generation backend for an Ollama server.
#[derive(Clone)]
pub struct OllamaBackend {
    http: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaBackend {
    /// Backend against the default local server and model.
    pub fn new() -> Self {
        Self::with_config(OLLAMA_URL.to_string(), GEN_MODEL.to_string())
    }

    /// Backend for a given server and model. `OLLAMA_GEN_TIMEOUT_SECS`
    /// overrides the request timeout.
    pub fn with_config(base_url: String, gen_model: String) -> Self {
        let secs = env_parse("OLLAMA_GEN_TIMEOUT_SECS").unwrap_or(GEN_TIMEOUT_SECS);
        Self {
            http: Client::new(),
            endpoint: base_url.trim_end_matches('/').to_string(),
            model: gen_model,
            timeout: Duration::from_secs(secs),
        }
    }

    /// Reads `OLLAMA_BASE` and `OLLAMA_GEN_MODEL`.
    pub fn from_env() -> Self {
        let base = std::env::var("OLLAMA_BASE").unwrap_or_else(|_| OLLAMA_URL.to_string());
        let model = std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| GEN_MODEL.to_string());
        Self::with_config(base, model)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// `true` when `/api/tags` answers with a success status. Transport
    /// errors are reported as `false`, not as an error.
    pub async fn health_check(&self) -> Result<bool> {
        let probe = self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(TAGS_PROBE_TIMEOUT)
            .send()
            .await;

        let healthy = match probe {
            Ok(resp) => {
                let ok = resp.status().is_success();
                if !ok {
                    warn!(status = %resp.status(), endpoint = %self.endpoint, "Ollama tags probe rejected");
                }
                ok
            }
            Err(e) => {
                warn!(error = %e, endpoint = %self.endpoint, "Ollama unreachable");
                false
            }
        };
        Ok(healthy)
    }

    async fn chat(&self, system: &str, prompt: &str, json: bool) -> Result<String> {
        let started = Instant::now();
        let exchange = Exchange::new(&self.model, system, prompt, json);

        let resp = self
            .http
            .post(format!("{}/api/chat", self.endpoint))
            .timeout(self.timeout)
            .json(&exchange)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("ollama chat request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("ollama chat {status}: {detail}")));
        }

        let reply: Reply = resp
            .json()
            .await
            .map_err(|e| Error::Inference(format!("ollama chat body: {e}")))?;

        debug!(
            reply_len = reply.message.content.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            json,
            "Chat reply received"
        );
        Ok(reply.message.content)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    content: &'a str,
}

/// Body of a non-streaming `/api/chat` call.
#[derive(Serialize)]
struct Exchange<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

impl<'a> Exchange<'a> {
    fn new(model: &'a str, system: &'a str, prompt: &'a str, json: bool) -> Self {
        let system_turn = (!system.is_empty()).then_some(Turn {
            role: "system",
            content: system,
        });
        let messages = system_turn
            .into_iter()
            .chain(std::iter::once(Turn {
                role: "user",
                content: prompt,
            }))
            .collect();
        Self {
            model,
            messages,
            stream: false,
            format: json.then_some("json"),
            think: json.then_some(false),
        }
    }
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Deserialize)]
struct Reply {
    message: ReplyMessage,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    #[instrument(skip_all, fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.model))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, false).await
    }

    #[instrument(skip_all, fields(subsystem = "inference", component = "ollama", op = "generate_json", model = %self.model))]
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_drops_trailing_slash() {
        let backend =
            OllamaBackend::with_config("http://gpu-box:11434/".to_string(), "qwen3:8b".to_string());
        assert_eq!(backend.endpoint, "http://gpu-box:11434");
        assert_eq!(backend.model_name(), "qwen3:8b");
    }

    #[test]
    fn test_timeout_override() {
        let backend = OllamaBackend::new().with_timeout_secs(7);
        assert_eq!(backend.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_json_exchange_disables_thinking() {
        let body = serde_json::to_value(Exchange::new("m", "rules", "entities", true)).unwrap();
        assert_eq!(body["format"], "json");
        assert_eq!(body["think"], false);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "entities");
    }

    #[test]
    fn test_plain_exchange_without_system_turn() {
        let body = serde_json::to_value(Exchange::new("m", "", "hello", false)).unwrap();
        assert!(body.get("format").is_none());
        assert!(body.get("think").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_reply_extracts_message_content() {
        let raw = r#"{"message": {"role": "assistant", "content": "{\"relationships\": []}"}, "done": true}"#;
        let reply: Reply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.message.content, r#"{"relationships": []}"#);
    }
}
