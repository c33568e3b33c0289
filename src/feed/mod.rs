//! Post harvesting from the LinkedIn activity feed.

pub mod engine;
pub mod extract;
pub mod scroll;
pub mod types;

pub use engine::{SyncConfig, SyncEngine, SyncOutcome};
pub use extract::Extractor;
pub use scroll::{GrowthSurface, ScrollConfig, ScrollController, ScrollOutcome};
pub use types::{Accumulator, Post};
