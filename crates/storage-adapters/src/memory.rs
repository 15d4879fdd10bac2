//! In-process document store.
//!
//! A transaction takes the store-wide lock for its whole lifetime, so
//! transactions are serialized and every read inside one sees a stable
//! snapshot. Writes are staged in an overlay and applied only on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domains::store::{merge_patch, Collection, Query};
use domains::{DocumentStore, StoreError, StoreTransaction};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Collections = HashMap<Collection, HashMap<String, Value>>;

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<Collections>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction { guard, staged: HashMap::new() }))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, StoreError> {
        let state = self.state.lock().await;
        let matched = state
            .get(&collection)
            .map(|docs| docs.values().filter(|doc| query.filter.matches(doc)).cloned().collect())
            .unwrap_or_default();
        Ok(query.arrange(matched))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    /// `None` marks a staged delete.
    staged: HashMap<(Collection, String), Option<Value>>,
}

impl MemoryTransaction {
    fn current(&self, collection: Collection, id: &str) -> Option<Value> {
        match self.staged.get(&(collection, id.to_string())) {
            Some(staged) => staged.clone(),
            None => self.guard.get(&collection).and_then(|docs| docs.get(id)).cloned(),
        }
    }

    fn existing(&self, collection: Collection, id: &str) -> Result<Value, StoreError> {
        self.current(collection, id)
            .ok_or_else(|| StoreError::Missing { collection, id: id.to_string() })
    }

    fn stage(&mut self, collection: Collection, id: &str, doc: Option<Value>) {
        self.staged.insert((collection, id.to_string()), doc);
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.current(collection, id))
    }

    async fn insert(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        if self.current(collection, id).is_some() {
            return Err(StoreError::Duplicate { collection, id: id.to_string() });
        }
        self.stage(collection, id, Some(doc));
        Ok(())
    }

    async fn replace(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        self.existing(collection, id)?;
        self.stage(collection, id, Some(doc));
        Ok(())
    }

    async fn patch(&mut self, collection: Collection, id: &str, patch: Value) -> Result<(), StoreError> {
        let mut doc = self.existing(collection, id)?;
        merge_patch(&mut doc, &patch);
        self.stage(collection, id, Some(doc));
        Ok(())
    }

    async fn increment(
        &mut self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let mut doc = self.existing(collection, id)?;
        let current = match doc.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::InvalidQuery(format!("{collection}.{field} is not an integer")))?,
        };
        if let Value::Object(map) = &mut doc {
            map.insert(field.to_string(), Value::from(current + delta));
        }
        self.stage(collection, id, Some(doc));
        Ok(())
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.existing(collection, id)?;
        self.stage(collection, id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, staged } = *self;
        for ((collection, id), doc) in staged {
            let docs = guard.entry(collection).or_default();
            match doc {
                Some(doc) => {
                    docs.insert(id, doc);
                }
                None => {
                    docs.remove(&id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Filter, SortOrder};
    use serde_json::json;

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(Collection::Users, "A", json!({ "id": "A", "totalPoints": 10 })).await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.increment(Collection::Users, "A", "totalPoints", 5).await.unwrap();
            tx.insert(Collection::Users, "B", json!({ "id": "B" })).await.unwrap();
            assert_eq!(tx.get(Collection::Users, "A").await.unwrap().unwrap()["totalPoints"], 15);
        }
        assert_eq!(store.get(Collection::Users, "A").await.unwrap().unwrap()["totalPoints"], 10);
        assert!(store.get(Collection::Users, "B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_become_visible_together() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.increment(Collection::Users, "A", "totalPoints", -25).await.unwrap();
        tx.insert(Collection::Records, "r1", json!({ "id": "r1", "userId": "A", "amount": -25 }))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get(Collection::Users, "A").await.unwrap().unwrap()["totalPoints"], -15);
        let records = store
            .query(Collection::Records, &Query::new(Filter::eq("userId", "A")))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let err = tx.insert(Collection::Users, "A", json!({ "id": "A" })).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn writes_to_missing_documents_fail() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.increment(Collection::Users, "nobody", "totalPoints", 1).await,
            Err(StoreError::Missing { .. })
        ));
        assert!(matches!(tx.delete(Collection::Gifts, "g").await, Err(StoreError::Missing { .. })));
    }

    #[tokio::test]
    async fn patch_and_delete_inside_transaction() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.patch(Collection::Users, "A", json!({ "partnerId": "B" })).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get(Collection::Users, "A").await.unwrap().unwrap()["partnerId"], "B");

        let mut tx = store.begin().await.unwrap();
        tx.delete(Collection::Users, "A").await.unwrap();
        assert!(tx.get(Collection::Users, "A").await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert!(store.get(Collection::Users, "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_orders_and_pages() {
        let store = MemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        for i in 0..5 {
            tx.insert(Collection::Notices, &format!("n{i}"), json!({ "id": format!("n{i}"), "createTime": i }))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let page = store
            .query(
                Collection::Notices,
                &Query::new(Filter::all()).order_by("createTime", SortOrder::Desc).limit(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|d| d["id"].as_str().unwrap().to_string()).collect();
        assert_eq!(ids, ["n4", "n3"]);
    }
}
