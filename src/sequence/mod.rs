//! Sequence Generator
//!
//! Allocates monotonically increasing ticket display numbers ("CHM-0001")
//! from a single counter document, read and incremented inside one atomic
//! transaction so concurrent creations never emit the same number.
//!
//! When the transaction cannot commit after the configured retries, callers
//! that must not block ticket intake degrade to a timestamp-derived number
//! via [`SequenceGenerator::next_ticket_number_or_fallback`]. Display numbers
//! are therefore unique enough for display only; the store document id stays
//! the primary key.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde_json::{json, Value};

use crate::config::CoreConfig;
use crate::store::{with_retry, DocumentStore, RetryPolicy, StoreError};

pub const SYSTEM_COLLECTION: &str = "_system";
pub const COUNTER_DOC: &str = "ticket_counter";
const COUNTER_FIELD: &str = "next_value";

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("counter transaction failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

pub struct SequenceGenerator {
    store: Arc<dyn DocumentStore>,
    prefix: String,
    width: usize,
    retry: RetryPolicy,
}

impl SequenceGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            prefix: config.number_prefix.clone(),
            width: config.number_width,
            retry: RetryPolicy::transaction().with_max_attempts(config.sequence_max_attempts),
        }
    }

    /// Allocates the next sequential display number.
    ///
    /// The read-modify-write runs inside a single store transaction: absent
    /// counter reads as 0, `next = current + 1` is written back atomically.
    pub async fn next_ticket_number(&self) -> Result<String, AllocationError> {
        let attempts = self.retry.max_attempts;
        let value = with_retry(self.retry, "allocate_ticket_number", || {
            self.store.transaction(Box::new(allocate_next))
        })
        .await
        .map_err(|source| AllocationError::Exhausted { attempts, source })?;

        let next = value.as_i64().unwrap_or(0);
        debug!("Allocated ticket number {next}");
        Ok(self.format(next))
    }

    /// Like [`next_ticket_number`](Self::next_ticket_number), but degrades to
    /// a wall-clock-derived number instead of failing, so ticket creation is
    /// never blocked by counter contention.
    pub async fn next_ticket_number_or_fallback(&self) -> String {
        match self.next_ticket_number().await {
            Ok(number) => number,
            Err(e) => {
                let fallback = Utc::now().timestamp() % 10_000;
                warn!("Ticket number allocation degraded to timestamp fallback: {e}");
                self.format(fallback)
            }
        }
    }

    fn format(&self, value: i64) -> String {
        format!("{}-{:0width$}", self.prefix, value, width = self.width)
    }

    /// Extracts the numeric part of a display number for ordering.
    /// Returns `None` for foreign prefixes or malformed numbers.
    pub fn parse_ticket_number(&self, number: &str) -> Option<i64> {
        number
            .strip_prefix(&self.prefix)?
            .strip_prefix('-')?
            .parse()
            .ok()
    }
}

fn allocate_next(tx: &mut dyn crate::store::TransactionOps) -> Result<Value, StoreError> {
    let current = tx
        .get(SYSTEM_COLLECTION, COUNTER_DOC)?
        .and_then(|doc| doc.data.get(COUNTER_FIELD).and_then(Value::as_i64))
        .unwrap_or(0);
    let next = current + 1;
    tx.set(SYSTEM_COLLECTION, COUNTER_DOC, json!({ COUNTER_FIELD: next }))?;
    Ok(Value::from(next))
}
