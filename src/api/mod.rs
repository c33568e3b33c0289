//! Authenticated REST mutations.

pub mod executor;
pub mod posts;

pub use executor::{ApiError, ApiExecutor};
pub use posts::PostsClient;
