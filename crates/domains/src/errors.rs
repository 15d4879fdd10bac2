//! # Errors
//!
//! `DomainError` is the only error that crosses the service boundary. The API
//! layer turns it into the uniform `{ success: false, message }` envelope, so
//! every `Display` string here is user-facing and must stay short.

use thiserror::Error;

use crate::store::Collection;

/// Failures of the document store itself.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{collection} document {id} not found")]
    Missing { collection: Collection, id: String },

    #[error("{collection} document {id} already exists")]
    Duplicate { collection: Collection, id: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Unreachable store, failed commit, lock timeout.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A precondition on shared state that did not hold.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    #[error("task status does not allow this action")]
    TaskStatus,

    #[error("task has already been revoked")]
    AlreadyRevoked,

    #[error("insufficient points")]
    InsufficientPoints,

    #[error("item has already been used")]
    ItemAlreadyUsed,

    #[error("invite code not found")]
    CodeNotFound,

    #[error("you are already bound to another partner")]
    CallerHasPartner,

    #[error("that user is already bound to another partner")]
    PartnerHasPartner,

    #[error("bind a partner first")]
    NotPaired,
}

/// Session verification failures. Kept apart from `DomainError`: they are
/// raised at the transport boundary before any operation runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid or expired session")]
    Invalid,
}

#[derive(Error, Debug)]
pub enum DomainError {
    /// Missing or malformed input, rejected before any read.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// The conflict kind, when this is a state conflict.
    pub fn conflict(&self) -> Option<Conflict> {
        match self {
            Self::Conflict(c) => Some(*c),
            _ => None,
        }
    }
}

/// A specialized Result type for domain logic.
pub type Result<T> = std::result::Result<T, DomainError>;
