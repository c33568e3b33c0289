//! lisync - LinkedIn post harvesting and publishing.
//!
//! This crate provides:
//! - Post harvesting from a member's activity feed via browser automation
//! - Incremental merge of harvested posts into per-day JSON archives
//! - OAuth credential lifecycle (authorize, persist, proactive refresh)
//! - Post create/edit/delete through the REST API with refresh-on-401

pub mod api;
pub mod archive;
pub mod auth;
pub mod feed;
pub mod session;

// Re-export main types
pub use api::{ApiError, PostsClient};
pub use archive::Archive;
pub use auth::{CredentialStore, Credentials, TokenAuthority};
pub use feed::{Accumulator, Post, SyncConfig, SyncEngine};
pub use session::{Session, SessionCookies};
