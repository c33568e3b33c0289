//! Per-day post archives.
//!
//! One JSON file per (profile, calendar day). Re-running on the same day
//! merges into the same file: union by activity id, with the new run's
//! records winning on conflict.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;

use crate::feed::Post;

/// Handle to one (profile, day) post collection on disk.
#[derive(Debug, Clone)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    /// Archive for the given profile and collection day.
    #[must_use]
    pub fn open(dir: &Path, profile: &str, day: NaiveDate) -> Self {
        let profile = sanitize_profile(profile);
        Self {
            path: dir.join(format!("posts_{profile}_{day}.json")),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted collection. A missing file is an empty collection;
    /// an unreadable one is treated the same way so a corrupt archive never
    /// aborts a run.
    #[must_use]
    pub fn load(&self) -> Vec<Post> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Archive unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Merge a run's posts with the persisted collection and write it back.
    /// Returns the merged collection.
    pub fn merge_and_save(&self, new: Vec<Post>) -> Result<Vec<Post>> {
        let merged = merge_posts(self.load(), new);
        let content = serde_json::to_string_pretty(&merged)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(merged)
    }
}

/// File-name-safe form of a profile id. Public profile ids are single URL
/// path segments already; anything else is replaced so the archive always
/// lands inside the output directory.
fn sanitize_profile(profile: &str) -> String {
    profile
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Union two post lists by id. Prior entries keep their position; colliding
/// ids take the new run's record; ids only in the new run are appended in
/// encounter order. Nothing is ever dropped.
#[must_use]
pub fn merge_posts(prior: Vec<Post>, new: Vec<Post>) -> Vec<Post> {
    let mut merged = prior;
    for post in new {
        match merged.iter_mut().find(|p| p.id == post.id) {
            Some(existing) => *existing = post,
            None => merged.push(post),
        }
    }
    merged
}
