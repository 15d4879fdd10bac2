//! Entities, errors and ports of the pairpoints backend.
//!
//! Nothing in this crate performs I/O; adapters implement the traits in
//! [`ports`] and services orchestrate them.

pub mod errors;
pub mod models;
pub mod ports;
pub mod store;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
pub use store::{Collection, Document, Filter, Query, SortOrder, Store, Transaction};
