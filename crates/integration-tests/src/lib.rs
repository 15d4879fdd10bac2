//! Shared fixtures for the cross-crate scenario tests.

use std::sync::Arc;

use async_trait::async_trait;
use domains::{Collection, DocumentStore, PushGateway, Query, Store, StoreError, StoreTransaction, Task, TaskType};
use serde_json::Value;
use services::{ledger, GiftCommand, GiftDraft, NewTask, Services};
use storage_adapters::{LogPushGateway, MemoryDocumentStore};

pub const ALICE: &str = "user-aaaaaa";
pub const BOB: &str = "user-bbbbbb";
pub const CAROL: &str = "user-cccccc";

pub fn memory_store() -> Store {
    Store::new(Arc::new(MemoryDocumentStore::new()))
}

pub fn services(store: &Store) -> Services {
    services_with_push(store, Arc::new(LogPushGateway::default()))
}

pub fn services_with_push(store: &Store, push: Arc<dyn PushGateway>) -> Services {
    Services::new(store.clone(), push)
}

/// Invite code of a fixture user.
pub fn code_of(user_id: &str) -> String {
    services::compute_invite_code(user_id)
}

pub async fn create_users(svc: &Services, ids: &[&str]) {
    for id in ids {
        svc.users.get_or_create(id).await.unwrap();
    }
}

/// Creates both users and binds `a` to `b`.
pub async fn paired(svc: &Services, a: &str, b: &str) {
    create_users(svc, &[a, b]).await;
    svc.pairing.bind(a, &code_of(b)).await.unwrap();
}

pub async fn publish(svc: &Services, creator: &str, target: &str, kind: TaskType, points: i64) -> Task {
    let input = NewTask { title: format!("{kind:?} for {points}"), points, kind, target_id: Some(target.to_string()) };
    svc.tasks.publish(creator, input).await.unwrap()
}

/// Gives `target` points through a confirmed reward task from `creator`.
pub async fn grant(svc: &Services, creator: &str, target: &str, points: i64) {
    let task = publish(svc, creator, target, TaskType::Reward, points).await;
    svc.tasks.confirm(creator, &task.id).await.unwrap();
}

pub async fn add_gift(svc: &Services, owner: &str, name: &str, points: i64) -> String {
    let draft = GiftDraft { name: Some(name.to_string()), points: Some(points), ..GiftDraft::default() };
    svc.gifts.upsert(owner, GiftCommand::Add(draft)).await.unwrap().unwrap()
}

pub async fn balance(store: &Store, user_id: &str) -> i64 {
    ledger::balance(store, user_id).await.unwrap()
}

/// Asserts the stored balance equals the sum of the user's records.
pub async fn assert_reconciled(store: &Store, user_id: &str) {
    let rec = ledger::reconcile(store, user_id).await.unwrap();
    assert_eq!(rec.drift(), 0, "{user_id}: balance {} vs ledger {}", rec.balance, rec.ledger_sum);
}

/// Wraps a store and refuses every write to `Notices`, standing in for a
/// notice collection that is unavailable.
pub struct NoticeRefusingStore {
    inner: Arc<dyn DocumentStore>,
}

impl NoticeRefusingStore {
    pub fn wrap(inner: Arc<dyn DocumentStore>) -> Store {
        Store::new(Arc::new(Self { inner }))
    }
}

#[async_trait]
impl DocumentStore for NoticeRefusingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(NoticeRefusingTransaction { inner: self.inner.begin().await? }))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.inner.query(collection, query).await
    }
}

struct NoticeRefusingTransaction {
    inner: Box<dyn StoreTransaction>,
}

fn refuse(collection: Collection) -> Result<(), StoreError> {
    if collection == Collection::Notices {
        return Err(StoreError::Backend("notices unavailable".into()));
    }
    Ok(())
}

#[async_trait]
impl StoreTransaction for NoticeRefusingTransaction {
    async fn get(&mut self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn insert(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        refuse(collection)?;
        self.inner.insert(collection, id, doc).await
    }

    async fn replace(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        refuse(collection)?;
        self.inner.replace(collection, id, doc).await
    }

    async fn patch(&mut self, collection: Collection, id: &str, patch: Value) -> Result<(), StoreError> {
        refuse(collection)?;
        self.inner.patch(collection, id, patch).await
    }

    async fn increment(&mut self, collection: Collection, id: &str, field: &str, delta: i64) -> Result<(), StoreError> {
        self.inner.increment(collection, id, field, delta).await
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}
