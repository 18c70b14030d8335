//! # Note Vault Core
//!
//! Pure logic for Note Vault: offset-preserving normalization, whole-word
//! blocklist redaction, the tiered search coordinator, snippet extraction
//! and result ranking.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! application dependencies. Storage is reached only through the
//! [`store::Store`] trait.

pub mod models;
pub mod normalize;
pub mod ranking;
pub mod redact;
pub mod search;
pub mod snippet;
pub mod store;
