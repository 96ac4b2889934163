//! Deterministic stand-ins for the generation and embedding backends.
//!
//! ```rust,ignore
//! use tessera_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_fallback(r#"{"relationships": []}"#);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use tessera_core::{EmbeddingBackend, Error, GenerationBackend, Result};

/// Scripted generation backend that records every call.
#[derive(Clone)]
pub struct MockGenerationBackend {
    script: Arc<Script>,
    log: Arc<Mutex<Vec<RecordedCall>>>,
}

#[derive(Debug, Clone)]
struct Script {
    fallback: String,
    by_needle: HashMap<String, String>,
    failure: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub system: String,
    pub prompt: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fallback: r#"{"relationships": []}"#.to_string(),
            by_needle: HashMap::new(),
            failure: None,
        }
    }
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply used when no needle matches the prompt.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.script).fallback = response.into();
        self
    }

    /// Return `output` when the prompt contains `needle`.
    pub fn responding_to(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.script)
            .by_needle
            .insert(needle.into(), output.into());
        self
    }

    /// Fail every call with `Error::Inference(message)`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.script).failure = Some(message.into());
        self
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn respond(&self, operation: &str, system: &str, prompt: &str) -> Result<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                operation: operation.to_string(),
                system: system.to_string(),
                prompt: prompt.to_string(),
            });

        if let Some(message) = &self.script.failure {
            return Err(Error::Inference(message.clone()));
        }
        let mapped = self
            .script
            .by_needle
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, output)| output.clone());
        Ok(mapped.unwrap_or_else(|| self.script.fallback.clone()))
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.respond("generate", system, prompt)
    }

    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.respond("generate_json", system, prompt)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Mock embedding backend producing deterministic unit vectors.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fail: bool,
    call_count: Arc<Mutex<usize>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deterministic embedding from character codes; equal texts embed equally.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; dimension.max(1)];
        let len = out.len();
        for (pos, ch) in text.to_lowercase().chars().enumerate() {
            out[(ch as usize + pos) % len] += 0.1;
        }
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.call_count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if self.fail {
            return Err(Error::Embedding("Simulated embedding failure".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| Self::generate(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
