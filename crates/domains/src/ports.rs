//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{AuthError, StoreError};
use crate::models::{NoticeType, UserId};
use crate::store::{Collection, Query};

/// Multi-document transactional store over JSON documents.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a transaction. Reads inside it see its own writes; nothing is
    /// visible to other readers until commit.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, StoreError>;
}

/// One open transaction. Dropping it without `commit` discards all writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Fails with `StoreError::Duplicate` if the id is taken.
    async fn insert(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError>;

    async fn replace(&mut self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Merge patch; `null` values remove fields.
    async fn patch(&mut self, collection: Collection, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Adds `delta` to a numeric field without a read-modify-write round trip
    /// through the caller. A missing field counts as zero.
    async fn increment(
        &mut self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError>;

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Out-of-band push message mirroring an in-app notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub receiver_id: UserId,
    #[serde(rename = "type")]
    pub kind: NoticeType,
    pub title: String,
    pub message: String,
    pub points: i64,
}

/// Fire-and-forget delivery to the user's device. Callers never wait on the
/// result for the outcome of an operation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: PushMessage) -> anyhow::Result<()>;
}

/// Opaque storage for avatars and gift covers.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes and returns their blob id.
    async fn put(&self, data: Bytes, content_type: Mime) -> anyhow::Result<String>;

    /// Public URL of a blob, or `None` if the id is malformed or unknown.
    async fn resolve(&self, blob_id: &str) -> Option<String>;
}

/// Turns a session token into the authenticated caller. Request payloads
/// never carry identity.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}
