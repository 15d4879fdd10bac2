//! # auth-adapters
//!
//! HS256 JWT implementation of `SessionVerifier`. The token's `sub` claim is
//! the user id; nothing else in the token is trusted.

#[cfg(feature = "auth-jwt")]
mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::{Claims, JwtSessions};
