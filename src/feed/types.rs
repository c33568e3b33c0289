//! Post records and the per-run accumulator.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single harvested post.
///
/// Identity is the activity identifier; two records with the same id are the
/// same post. Records are immutable once produced - a merge replaces the whole
/// record rather than patching fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Canonical activity identifier (`urn:li:activity:<digits>`).
    pub id: String,
    /// Post text content.
    pub text: String,
    /// Relative publish time as rendered on the page (e.g. "3d").
    pub posted_at: String,
    /// Reaction count.
    pub likes: u64,
    /// Comment count.
    pub comments: u64,
    /// Reshare count.
    pub shares: u64,
    /// Canonical URL of the post.
    pub url: String,
}

impl Post {
    /// Canonical feed URL for an activity urn.
    #[must_use]
    pub fn permalink(id: &str) -> String {
        format!("https://www.linkedin.com/feed/update/{id}/")
    }
}

/// Run-scoped dedup map from activity id to post, preserving encounter order.
///
/// The interception task inserts records while the scroll loop polls the
/// length, so the map lives behind a mutex. The only in-run operation is
/// insert-if-absent, which is commutative and idempotent regardless of
/// arrival order.
#[derive(Debug, Default)]
pub struct Accumulator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    posts: Vec<Post>,
    seen: HashSet<String>,
}

impl Accumulator {
    /// Insert a post unless its id was already seen. Returns true if inserted.
    pub fn insert(&self, post: Post) -> bool {
        let mut inner = self.inner.lock().expect("accumulator poisoned");
        if !inner.seen.insert(post.id.clone()) {
            return false;
        }
        inner.posts.push(post);
        true
    }

    /// Number of distinct posts collected so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("accumulator poisoned").posts.len()
    }

    /// Whether no posts have been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the first `n` posts in encounter order.
    pub fn truncate(&self, n: usize) {
        self.inner.lock().expect("accumulator poisoned").posts.truncate(n);
    }

    /// Clone out the collected posts in encounter order.
    pub fn snapshot(&self) -> Vec<Post> {
        self.inner.lock().expect("accumulator poisoned").posts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, likes: u64) -> Post {
        Post {
            id: id.to_string(),
            text: format!("text for {id}"),
            posted_at: "2d".to_string(),
            likes,
            comments: 0,
            shares: 0,
            url: Post::permalink(id),
        }
    }

    #[test]
    fn test_insert_dedupes_by_id() {
        let acc = Accumulator::default();
        assert!(acc.insert(post("urn:li:activity:1", 5)));
        assert!(!acc.insert(post("urn:li:activity:1", 9)));
        assert_eq!(acc.len(), 1);
        // First fully-formed record wins within a run.
        assert_eq!(acc.snapshot()[0].likes, 5);
    }

    #[test]
    fn test_truncate_preserves_encounter_order() {
        let acc = Accumulator::default();
        for i in 0..5 {
            acc.insert(post(&format!("urn:li:activity:{i}"), i));
        }
        acc.truncate(3);
        let ids: Vec<_> = acc.snapshot().into_iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec![
                "urn:li:activity:0",
                "urn:li:activity:1",
                "urn:li:activity:2"
            ]
        );
    }

    #[test]
    fn test_permalink() {
        assert_eq!(
            Post::permalink("urn:li:activity:42"),
            "https://www.linkedin.com/feed/update/urn:li:activity:42/"
        );
    }
}
