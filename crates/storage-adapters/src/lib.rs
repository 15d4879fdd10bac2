//! Storage-side adapters: document stores, blob storage, push delivery.

pub mod memory;
pub mod push;

#[cfg(feature = "media-local")]
pub mod blob_local;

#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use push::LogPushGateway;

#[cfg(feature = "media-local")]
pub use blob_local::LocalBlobStore;

#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteDocumentStore;

#[cfg(feature = "push-webhook")]
pub use push::WebhookPushGateway;
