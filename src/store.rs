//! The persistence boundary.
//!
//! The document store is an external collaborator: it accepts one flat
//! label → string-or-absent mapping and stores it as a new record in a named
//! collection. Like the engine, it is modelled as a swappable capability
//! trait so tests and dry runs never touch a network.
//!
//! Persistence is insert-only and never retried automatically: a failed
//! `persist` surfaces its error and leaves the already-computed
//! [`ExtractionResult`] untouched, so the caller can simply call `persist`
//! again with the same result.

use crate::error::FieldlensError;
use crate::output::ExtractionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Identity of a stored result, assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Store-generated identifier for the new record.
    pub id: String,
    /// The collection the record was inserted into.
    pub collection: String,
}

/// Capability interface for the external document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert the result as one new record. Every call creates a new record;
    /// there are no upsert or merge semantics.
    async fn persist(&self, result: &ExtractionResult) -> Result<PersistedRecord, FieldlensError>;
}

// ── HTTP store ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InsertResponse {
    id: String,
}

/// A [`DocumentStore`] backed by an HTTP document-store endpoint.
///
/// Records are POSTed as JSON to `{base_url}/{collection}`; the store
/// responds with the generated record id.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpDocumentStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, FieldlensError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FieldlensError::Internal(format!("HTTP client: {e}")))?;
        Ok(HttpDocumentStore {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    fn insert_url(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn persist(&self, result: &ExtractionResult) -> Result<PersistedRecord, FieldlensError> {
        let body = Value::Object(result.to_field_map());

        let response = self
            .client
            .post(self.insert_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    FieldlensError::StoreUnreachable {
                        detail: e.to_string(),
                    }
                } else {
                    FieldlensError::StoreWriteFailed {
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FieldlensError::StoreWriteFailed {
                detail: format!("HTTP {status}"),
            });
        }

        let inserted: InsertResponse =
            response
                .json()
                .await
                .map_err(|e| FieldlensError::StoreWriteFailed {
                    detail: format!("malformed insert response: {e}"),
                })?;

        info!(id = %inserted.id, collection = %self.collection, "result persisted");

        Ok(PersistedRecord {
            id: inserted.id,
            collection: self.collection.clone(),
        })
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// An in-process [`DocumentStore`] for tests and dry runs.
///
/// Stores each record as the same flat JSON object the HTTP store would
/// send, so assertions exercise the real wire shape.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<Value>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record persisted so far.
    pub fn records(&self) -> Vec<Value> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn persist(&self, result: &ExtractionResult) -> Result<PersistedRecord, FieldlensError> {
        let record = Value::Object(result.to_field_map());
        self.records
            .lock()
            .map_err(|_| FieldlensError::Internal("in-memory store poisoned".into()))?
            .push(record);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PersistedRecord {
            id: format!("mem-{id}"),
            collection: "memory".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ExtractionStats, FieldAnswer, FieldResult, RunStatus};

    fn one_field_result() -> ExtractionResult {
        ExtractionResult {
            fields: vec![FieldResult {
                index: 0,
                key: "Invoice Number".to_string(),
                answer: FieldAnswer::Answered("INV-7".to_string()),
                confidence: Some(0.8),
                duration_ms: 3,
                retries: 0,
                error: None,
            }],
            status: RunStatus::Completed,
            stats: ExtractionStats {
                total_fields: 1,
                answered_fields: 1,
                no_answer_fields: 0,
                dispatched_fields: 1,
                total_duration_ms: 3,
            },
        }
    }

    #[tokio::test]
    async fn in_memory_store_creates_a_new_record_per_call() {
        let store = InMemoryStore::new();
        let result = one_field_result();

        let first = store.persist(&result).await.expect("insert must succeed");
        let second = store.persist(&result).await.expect("insert must succeed");

        assert_ne!(first.id, second.id, "insert-only: every call is a new record");
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0]["Invoice Number"], "INV-7");
    }

    #[test]
    fn http_store_builds_insert_url() {
        let store = HttpDocumentStore::new("http://localhost:9200/", "invoices", 30)
            .expect("client must build");
        assert_eq!(store.insert_url(), "http://localhost:9200/invoices");
    }
}
