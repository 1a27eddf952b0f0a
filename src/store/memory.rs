use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Document, DocumentStore, Query, StoreError, TransactionFn, TransactionOps};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// In-process store used by tests and local development.
///
/// Documents iterate in ascending id order, matching the backend's default
/// ordering, which keeps cursor pagination deterministic. Transactions are
/// serialized by a dedicated mutex and commit their staged writes under the
/// write lock, so readers never observe a half-applied transaction.
#[derive(Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    txn_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge_fields(target: &mut Value, patch: Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let existing = docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        merge_fields(existing, data);
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let docs = match collections.get(&query.collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        let mut results = Vec::new();
        let mut past_cursor = query.start_after.is_none();
        for (id, data) in docs {
            if !past_cursor {
                if Some(id.as_str()) == query.start_after.as_deref() {
                    past_cursor = true;
                }
                continue;
            }
            let doc = Document::new(id, data.clone());
            if query.filters.iter().all(|f| f.matches(&doc)) {
                results.push(doc);
                if let Some(limit) = query.limit {
                    if results.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    async fn count(&self, query: Query) -> Result<usize, StoreError> {
        let unbounded = Query {
            limit: None,
            ..query
        };
        Ok(self.query(unbounded).await?.len())
    }

    async fn transaction(&self, f: TransactionFn) -> Result<Value, StoreError> {
        let _serialized = self.txn_lock.lock().await;
        let mut collections = self.collections.write().await;
        let mut staged = StagedTransaction {
            collections: &collections,
            writes: Vec::new(),
        };
        let result = f(&mut staged)?;

        // Commit only after the closure succeeded: all-or-nothing.
        let writes = staged.writes;
        for write in writes {
            match write {
                StagedWrite::Set {
                    collection,
                    id,
                    data,
                } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                StagedWrite::Update {
                    collection,
                    id,
                    data,
                } => {
                    let existing = collections
                        .entry(collection)
                        .or_default()
                        .entry(id)
                        .or_insert_with(|| Value::Object(Default::default()));
                    merge_fields(existing, data);
                }
            }
        }
        Ok(result)
    }
}

enum StagedWrite {
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    Update {
        collection: String,
        id: String,
        data: Value,
    },
}

struct StagedTransaction<'a> {
    collections: &'a Collections,
    writes: Vec<StagedWrite>,
}

impl StagedTransaction<'_> {
    fn staged_view(&self, collection: &str, id: &str) -> Option<Value> {
        let mut current = self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        for write in &self.writes {
            match write {
                StagedWrite::Set {
                    collection: c,
                    id: i,
                    data,
                } if c == collection && i == id => current = Some(data.clone()),
                StagedWrite::Update {
                    collection: c,
                    id: i,
                    data,
                } if c == collection && i == id => {
                    let base = current.get_or_insert_with(|| Value::Object(Default::default()));
                    merge_fields(base, data.clone());
                }
                _ => {}
            }
        }
        current
    }
}

impl TransactionOps for StagedTransaction<'_> {
    fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .staged_view(collection, id)
            .map(|data| Document::new(id, data)))
    }

    fn set(&mut self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.writes.push(StagedWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        Ok(())
    }

    fn update(&mut self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.writes.push(StagedWrite::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterOp;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_update_roundtrip() {
        let store = MemoryStore::new();
        store
            .set("tickets", "t1", json!({"status": "open", "category": "Maintenance"}))
            .await
            .unwrap();
        store
            .update("tickets", "t1", json!({"status": "done"}))
            .await
            .unwrap();

        let doc = store.get("tickets", "t1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), "done");
        assert_eq!(doc.str_field("category"), "Maintenance");
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("tickets", "missing", json!({"status": "done"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_respects_filters_limit_and_cursor() {
        let store = MemoryStore::new();
        for i in 1..=5 {
            let status = if i % 2 == 0 { "done" } else { "open" };
            store
                .set("tickets", &format!("t{i}"), json!({"status": status}))
                .await
                .unwrap();
        }

        let open = store
            .query(Query::new("tickets").filter("status", FilterOp::Eq, json!("open")))
            .await
            .unwrap();
        assert_eq!(
            open.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t3", "t5"]
        );

        let resumed = store
            .query(
                Query::new("tickets")
                    .filter("status", FilterOp::Eq, json!("open"))
                    .start_after("t1")
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].id, "t3");
    }

    #[tokio::test]
    async fn count_ignores_limit() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .set("tickets", &format!("t{i}"), json!({"status": "open"}))
                .await
                .unwrap();
        }
        let n = store
            .count(
                Query::new("tickets")
                    .filter("status", FilterOp::Eq, json!("open"))
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(n, 4);
    }

    #[tokio::test]
    async fn failed_transaction_stages_nothing() {
        let store = MemoryStore::new();
        store.set("tickets", "t1", json!({"n": 1})).await.unwrap();

        let result = store
            .transaction(Box::new(|tx| {
                tx.set("tickets", "t1", json!({"n": 2}))?;
                Err(StoreError::Internal("boom".into()))
            }))
            .await;
        assert!(result.is_err());

        let doc = store.get("tickets", "t1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let out = store
            .transaction(Box::new(|tx| {
                tx.set("c", "d", json!({"v": 1}))?;
                tx.update("c", "d", json!({"w": 2}))?;
                let doc = tx.get("c", "d")?.expect("staged doc visible");
                Ok(doc.data)
            }))
            .await
            .unwrap();
        assert_eq!(out, json!({"v": 1, "w": 2}));
    }
}
