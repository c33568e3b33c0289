//! Run orchestration: intercept, scroll, extract, merge, persist.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::archive::Archive;
use crate::session::Session;

use super::extract::Extractor;
use super::scroll::{ScrollConfig, ScrollController, ScrollOutcome};
use super::types::{Accumulator, Post};

/// Configuration for a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the per-day archives.
    pub output_dir: PathBuf,
    /// Stop once this many distinct posts are collected.
    pub limit: Option<usize>,
    /// Hard cap on scroll rounds.
    pub max_rounds: usize,
    /// Wait after each scroll before the next measurement.
    pub settle: Duration,
    /// Wait after the scroll loop for in-flight responses to land.
    pub drain: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./posts"),
            limit: None,
            max_rounds: 40,
            settle: Duration::from_secs(2),
            drain: Duration::from_secs(3),
        }
    }
}

/// What a synchronization run produced.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Profile whose posts were collected.
    pub profile: String,
    /// Posts harvested by this run (after the limit).
    pub harvested: usize,
    /// Merged collection now persisted for (profile, today).
    pub posts: Vec<Post>,
    /// Archive file the collection was written to.
    pub archive_path: PathBuf,
    /// Why pagination stopped.
    pub scroll_outcome: ScrollOutcome,
}

/// Drives one full synchronization run against a live session.
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    /// Engine with the given configuration.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Collect the target's posts, merge them with the persisted collection
    /// for (profile, today), persist the union, and return it.
    ///
    /// `target` is an explicit public profile id; `None` resolves the
    /// session's current user, which is fatal if it fails - nothing is
    /// navigated or collected in that case.
    pub async fn run(&self, session: &Session, target: Option<&str>) -> Result<SyncOutcome> {
        let profile = match target {
            Some(p) => p.to_string(),
            None => session.resolve_current_user().await?,
        };
        tracing::info!(profile, limit = ?self.config.limit, "Starting sync run");

        // Interception starts before navigation so the first page of
        // responses is not missed.
        let accumulator = Arc::new(Accumulator::default());
        let mut tap = session.subscribe_feed_payloads().await?;
        let fold = {
            let accumulator = accumulator.clone();
            tokio::spawn(async move {
                fold_payloads(&mut tap.payloads, &accumulator).await;
            })
        };

        session.goto_activity(&profile).await?;

        let controller = ScrollController::new(ScrollConfig {
            max_rounds: self.config.max_rounds,
            settle: self.config.settle,
        });
        let limit = self.config.limit;
        let scroll_outcome = {
            let accumulator = accumulator.clone();
            controller
                .run(session, move || {
                    limit.is_some_and(|n| accumulator.len() >= n)
                })
                .await?
        };
        tracing::info!(?scroll_outcome, collected = accumulator.len(), "Pagination finished");

        // Drain before truncating so in-flight responses still contribute
        // before uniqueness is frozen.
        tokio::time::sleep(self.config.drain).await;
        // Abort alone only cancels at the next await point; waiting for the
        // task ensures no insert lands after the truncation below.
        fold.abort();
        let _ = fold.await;

        if let Some(n) = self.config.limit {
            accumulator.truncate(n);
        }
        let harvested = accumulator.snapshot();
        let harvested_count = harvested.len();

        let archive = Archive::open(&self.config.output_dir, &profile, Utc::now().date_naive());
        let posts = archive.merge_and_save(harvested)?;
        tracing::info!(
            harvested = harvested_count,
            merged = posts.len(),
            path = %archive.path().display(),
            "Persisted collection"
        );

        Ok(SyncOutcome {
            profile,
            harvested: harvested_count,
            posts,
            archive_path: archive.path().to_path_buf(),
            scroll_outcome,
        })
    }
}

/// Folds intercepted payloads into the accumulator until the channel closes.
async fn fold_payloads(payloads: &mut mpsc::Receiver<Value>, accumulator: &Accumulator) {
    let mut extractor = Extractor::new();
    while let Some(payload) = payloads.recv().await {
        for post in extractor.extract(&payload) {
            if accumulator.insert(post) {
                tracing::debug!(total = accumulator.len(), "Collected post");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(digits: u64) -> Value {
        json!({
            "included": [{
                "entityUrn": format!("urn:li:fsd_update:(urn:li:activity:{digits},MEMBER_SHARES)"),
                "commentary": { "text": { "text": format!("post {digits}") } },
            }]
        })
    }

    fn spawn_fold(
        mut rx: mpsc::Receiver<Value>,
        accumulator: Arc<Accumulator>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { fold_payloads(&mut rx, &accumulator).await })
    }

    #[tokio::test]
    async fn test_no_insert_lands_after_quiesce_and_truncate() {
        let accumulator = Arc::new(Accumulator::default());
        let (tx, rx) = mpsc::channel(8);
        let fold = spawn_fold(rx, accumulator.clone());

        for i in 0..5 {
            tx.send(payload(i)).await.unwrap();
        }
        while accumulator.len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The same ordering the run uses to freeze uniqueness.
        fold.abort();
        let _ = fold.await;
        accumulator.truncate(2);

        // Nothing is left consuming the tap, so this can never land.
        let _ = tx.send(payload(9)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(accumulator.len(), 2);
    }

    #[tokio::test]
    async fn test_fold_ends_when_tap_closes() {
        let accumulator = Arc::new(Accumulator::default());
        let (tx, rx) = mpsc::channel(8);
        let fold = spawn_fold(rx, accumulator.clone());

        tx.send(payload(1)).await.unwrap();
        drop(tx);
        fold.await.unwrap();
        assert_eq!(accumulator.len(), 1);
    }
}
