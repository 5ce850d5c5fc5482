//! The Document-QA engine boundary.
//!
//! The inference engine is an external collaborator: given a binarised
//! document image and a natural-language question, it returns ranked
//! candidate answers. Its internals (model, batching, hardware) are out of
//! scope here, so the boundary is a swappable [`DocumentQaEngine`] trait —
//! production code injects an HTTP-backed engine, tests inject a scripted
//! mock.
//!
//! [`HttpQaEngine`] speaks the common inference-endpoint shape for
//! document question answering: a JSON request carrying the question and the
//! base64-encoded PNG of the page, a JSON array of `{answer, score}`
//! candidates back, ordered by descending score.

use crate::error::FieldlensError;
use crate::pipeline::preprocess::PreprocessedImage;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One ranked candidate answer from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    /// The candidate answer text.
    pub text: String,
    /// The engine's confidence in this candidate, higher is better.
    pub confidence: f32,
}

/// An error from a single engine call.
///
/// Engine errors are absorbed by the extraction engine — converted to
/// `NoAnswer` with a recorded [`crate::error::FieldError`] — and never
/// surfaced to the caller of `extract`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request could not be sent or came back with an error status.
    #[error("DocQA request failed: {0}")]
    Request(String),

    /// The engine responded, but the body was not the expected shape.
    #[error("DocQA response malformed: {0}")]
    MalformedResponse(String),
}

/// Capability interface for the external Document-QA collaborator.
///
/// Implementations must be `Send + Sync`: the extraction engine calls
/// `answer` from several workers concurrently, all sharing one engine
/// instance behind an `Arc`.
#[async_trait]
pub trait DocumentQaEngine: Send + Sync {
    /// Answer a single question about the image.
    ///
    /// Returns candidates ordered by descending confidence; an empty vector
    /// means the engine found no answer (a valid outcome, not an error).
    async fn answer(
        &self,
        question: &str,
        image: &PreprocessedImage,
    ) -> Result<Vec<AnswerCandidate>, EngineError>;
}

impl std::fmt::Debug for dyn DocumentQaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DocumentQaEngine")
    }
}

// ── HTTP engine ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct QaRequest<'a> {
    question: &'a str,
    /// Base64-encoded PNG of the preprocessed page.
    image: String,
}

#[derive(Deserialize)]
struct QaCandidate {
    answer: String,
    #[serde(default)]
    score: f32,
}

/// A [`DocumentQaEngine`] backed by an HTTP inference endpoint.
pub struct HttpQaEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQaEngine {
    /// Build an engine client for `endpoint` with a per-call timeout.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, FieldlensError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FieldlensError::Internal(format!("HTTP client: {e}")))?;
        Ok(HttpQaEngine {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentQaEngine for HttpQaEngine {
    async fn answer(
        &self,
        question: &str,
        image: &PreprocessedImage,
    ) -> Result<Vec<AnswerCandidate>, EngineError> {
        let png = image
            .to_png_bytes()
            .map_err(|e| EngineError::Request(format!("image encoding: {e}")))?;
        let body = QaRequest {
            question,
            image: STANDARD.encode(&png),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Request(format!("HTTP {status}")));
        }

        let candidates: Vec<QaCandidate> = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;

        debug!(
            question,
            candidates = candidates.len(),
            "DocQA call returned"
        );

        Ok(candidates
            .into_iter()
            .map(|c| AnswerCandidate {
                text: c.answer,
                confidence: c.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_response_deserialises_without_score() {
        let parsed: Vec<QaCandidate> =
            serde_json::from_str(r#"[{"answer": "INV-42"}]"#).expect("must parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].answer, "INV-42");
        assert_eq!(parsed[0].score, 0.0);
    }

    #[test]
    fn http_engine_keeps_endpoint() {
        let engine = HttpQaEngine::new("http://localhost:8080/qa", 30).expect("client must build");
        assert_eq!(engine.endpoint(), "http://localhost:8080/qa");
    }
}
