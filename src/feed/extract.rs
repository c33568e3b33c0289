//! Voyager payload extraction.
//!
//! The feed page loads content through GraphQL responses whose `included`
//! array mixes heterogeneous item shapes. Two of them matter here: social
//! activity counts (keyed by activity urn) and update commentary (the post
//! text). Counts and text for the same post are not guaranteed to arrive in
//! the same response, so the extractor keeps a session-scoped counts lookup
//! and correlates across payloads.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use super::types::Post;

/// Engagement counters for one activity. Missing fields default to zero.
#[derive(Debug, Clone, Copy, Default)]
struct Engagement {
    likes: u64,
    comments: u64,
    shares: u64,
}

/// Extracts post records from intercepted feed payloads.
///
/// Malformed or irrelevant payloads yield an empty batch; extraction never
/// fails. One payload may contribute records for several posts.
pub struct Extractor {
    activity_re: Regex,
    counts: HashMap<String, Engagement>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Create an extractor with an empty counts lookup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            activity_re: Regex::new(r"activity:(\d+)").expect("invalid activity regex"),
            counts: HashMap::new(),
        }
    }

    /// Extract zero or more posts from one raw payload.
    pub fn extract(&mut self, payload: &Value) -> Vec<Post> {
        let Some(included) = payload.get("included").and_then(Value::as_array) else {
            return Vec::new();
        };

        // Pass 1: fold counts items into the session-scoped lookup.
        for item in included {
            let Some(urn) = item.get("entityUrn").and_then(Value::as_str) else {
                continue;
            };
            if !urn.contains("socialActivityCounts") {
                continue;
            }
            let Some(digits) = self.activity_digits(urn) else {
                continue;
            };
            self.counts.insert(
                digits,
                Engagement {
                    likes: count_field(item, "numLikes"),
                    comments: count_field(item, "numComments"),
                    shares: count_field(item, "numShares"),
                },
            );
        }

        // Pass 2: emit a post per commentary item. Items whose entity urn has
        // no activity reference are other content types (reshares, comments)
        // and are skipped.
        let mut posts = Vec::new();
        for item in included {
            let Some(text) = commentary_text(item) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let Some(urn) = item.get("entityUrn").and_then(Value::as_str) else {
                continue;
            };
            let Some(digits) = self.activity_digits(urn) else {
                tracing::debug!(urn, "No activity reference in entity urn, skipping");
                continue;
            };

            // A late-arriving counts item must not block the text; default to
            // zero-filled counts when the lookup has nothing yet.
            let engagement = self.counts.get(&digits).copied().unwrap_or_default();
            let id = format!("urn:li:activity:{digits}");

            posts.push(Post {
                url: Post::permalink(&id),
                id,
                text,
                posted_at: relative_time(item),
                likes: engagement.likes,
                comments: engagement.comments,
                shares: engagement.shares,
            });
        }

        posts
    }

    /// Pull the digit portion out of an activity urn.
    fn activity_digits(&self, urn: &str) -> Option<String> {
        self.activity_re
            .captures(urn)
            .map(|c| c[1].to_string())
    }
}

/// Read a non-negative counter field, defaulting to zero when absent.
fn count_field(item: &Value, key: &str) -> u64 {
    item.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Commentary text, tolerating both the bare-string and nested-object shapes.
fn commentary_text(item: &Value) -> Option<String> {
    let commentary = item.get("commentary")?;
    let text = commentary.get("text")?;
    match text {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => text
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Relative publish time from the actor sub-description (e.g. "3d •").
fn relative_time(item: &Value) -> String {
    let text = item
        .pointer("/actor/subDescription/text")
        .or_else(|| item.pointer("/actor/subDescription"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    text.split('•').next().unwrap_or_default().trim().to_string()
}
