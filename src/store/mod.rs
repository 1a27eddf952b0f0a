//! Document Store Abstraction
//!
//! Narrow client interface over the backing document store. Every engine in
//! this crate talks to the store exclusively through [`DocumentStore`]:
//!
//! - **Point reads/writes**: `get`, `set`, `update`, `add`
//! - **Queries**: equality/inequality filters, limit, resume-after-document
//! - **Aggregates**: `count` without loading documents
//! - **Transactions**: all-or-nothing read-modify-write, serialized per
//!   document (the sequence counter depends on this)
//!
//! [`MemoryStore`] is the in-process implementation used by tests and local
//! development. Production backends implement the same trait behind the
//! service boundary.

pub mod memory;
pub mod retry;

pub use memory::MemoryStore;
pub use retry::{with_retry, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A document as returned by the store: its id plus the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// String field accessor, empty string when absent or non-string.
    pub fn str_field(&self, field: &str) -> &str {
        self.data.get(field).and_then(Value::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gte,
}

/// A single store-side predicate. Only fields covered by an index may be
/// filtered server-side; everything else is a residual filter applied by the
/// caller after retrieval (see `filters` module).
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Evaluates the filter against a document. Timestamps compare
    /// chronologically, numbers numerically, everything else as strings.
    pub fn matches(&self, doc: &Document) -> bool {
        let actual = doc.data.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Neq => actual != &self.value,
            FilterOp::Gte => match compare_values(actual, &self.value) {
                Some(ord) => ord != std::cmp::Ordering::Less,
                None => false,
            },
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        // RFC 3339 timestamps with differing subsecond precision do not sort
        // lexicographically; compare parsed instants when both sides parse.
        if let (Ok(ta), Ok(tb)) = (
            a.parse::<DateTime<Utc>>(),
            b.parse::<DateTime<Utc>>(),
        ) {
            return Some(ta.cmp(&tb));
        }
        return Some(a.cmp(b));
    }
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    None
}

/// A store query: collection, server-side filters, limit and an optional
/// resume point (cursor-based forward pagination, no offsets).
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<usize>,
    pub start_after: Option<String>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(FieldFilter::new(field, op, value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, doc_id: impl Into<String>) -> Self {
        self.start_after = Some(doc_id.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Transient failures worth retrying with backoff. Mirrors the retryable
    /// set of the managed backend (conflict, unavailable, deadline).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Unavailable(_) | Self::DeadlineExceeded(_)
        )
    }
}

/// Read/write handle passed to a transaction closure. All writes are staged
/// and become visible atomically when the closure returns `Ok`.
pub trait TransactionOps {
    fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
    fn set(&mut self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;
    fn update(&mut self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;
}

pub type TransactionFn =
    Box<dyn FnOnce(&mut dyn TransactionOps) -> Result<Value, StoreError> + Send>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Creates or fully replaces a document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    /// Merges the given fields into an existing document.
    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    /// Adds a document with a generated id, returning the id.
    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError>;

    /// Server-side aggregate count for the query's filters.
    async fn count(&self, query: Query) -> Result<usize, StoreError>;

    /// Runs `f` as one all-or-nothing transaction. Concurrent transactions
    /// touching the same documents serialize; a lost race surfaces as
    /// [`StoreError::Conflict`], which callers retry via [`with_retry`].
    async fn transaction(&self, f: TransactionFn) -> Result<Value, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_filter_eq_and_neq() {
        let doc = Document::new("t1", json!({"status": "open", "priority": 1}));
        assert!(FieldFilter::new("status", FilterOp::Eq, json!("open")).matches(&doc));
        assert!(!FieldFilter::new("status", FilterOp::Eq, json!("done")).matches(&doc));
        assert!(FieldFilter::new("status", FilterOp::Neq, json!("done")).matches(&doc));
    }

    #[test]
    fn gte_compares_timestamps_chronologically() {
        // Lexicographic comparison would order these two the wrong way round.
        let doc = Document::new("t1", json!({"opened_at": "2026-08-01T10:00:00.500Z"}));
        let filter = FieldFilter::new("opened_at", FilterOp::Gte, json!("2026-08-01T10:00:00Z"));
        assert!(filter.matches(&doc));

        let earlier = Document::new("t2", json!({"opened_at": "2026-07-31T23:59:59Z"}));
        assert!(!filter.matches(&earlier));
    }

    #[test]
    fn gte_on_missing_field_never_matches() {
        let doc = Document::new("t1", json!({}));
        let filter = FieldFilter::new("opened_at", FilterOp::Gte, json!("2026-08-01T00:00:00Z"));
        assert!(!filter.matches(&doc));
    }
}
