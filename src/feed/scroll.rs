//! Bounded feed pagination.
//!
//! A polling loop that asks the page for more content until the feed stops
//! growing, the caller's target is met, or a hard round cap is hit. This is
//! not an event-driven wait: correctness only depends on the feed's rendered
//! size being non-decreasing, not on timing.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Consecutive identical measurements that signal the feed is exhausted.
const FLAT_MEASUREMENTS_TO_CONVERGE: u32 = 3;

/// A content surface that can report its size and be asked to grow.
#[async_trait]
pub trait GrowthSurface {
    /// Current rendered content size (monotonically non-decreasing).
    async fn measure(&self) -> Result<u64>;

    /// Request more content (e.g. scroll to the bottom).
    async fn load_more(&self) -> Result<()>;
}

/// Configuration for the pagination loop.
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Hard cap on rounds, the safety bound against never-converging pages.
    pub max_rounds: usize,
    /// Fixed wait after each load-more before the next measurement.
    pub settle: Duration,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_rounds: 40,
            settle: Duration::from_secs(2),
        }
    }
}

/// Why the pagination loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// Content size unchanged across three consecutive measurements.
    Converged,
    /// The caller's predicate reported the target is already satisfied.
    TargetReached,
    /// The hard round cap was hit.
    CapReached,
}

/// Drives a [`GrowthSurface`] until one of the three terminal conditions.
pub struct ScrollController {
    config: ScrollConfig,
}

impl ScrollController {
    /// Create a controller with the given bounds.
    #[must_use]
    pub fn new(config: ScrollConfig) -> Self {
        Self { config }
    }

    /// Run the loop. `is_satisfied` is checked once per round before any
    /// measurement and doubles as the cooperative cancellation point.
    pub async fn run<S>(
        &self,
        surface: &S,
        mut is_satisfied: impl FnMut() -> bool,
    ) -> Result<ScrollOutcome>
    where
        S: GrowthSurface + ?Sized,
    {
        let mut last: Option<u64> = None;
        let mut flat: u32 = 0;

        for round in 0..self.config.max_rounds {
            if is_satisfied() {
                tracing::debug!(round, "Target satisfied, stopping pagination");
                return Ok(ScrollOutcome::TargetReached);
            }

            let size = surface.measure().await?;
            if last == Some(size) {
                flat += 1;
            } else {
                // A fresh value counts as the first measurement of its run.
                flat = 1;
            }
            tracing::trace!(round, size, flat, "Measured feed");

            if flat >= FLAT_MEASUREMENTS_TO_CONVERGE {
                tracing::debug!(round, size, "Feed converged");
                return Ok(ScrollOutcome::Converged);
            }
            last = Some(size);

            surface.load_more().await?;
            tokio::time::sleep(self.config.settle).await;
        }

        tracing::debug!(max_rounds = self.config.max_rounds, "Pagination cap reached");
        Ok(ScrollOutcome::CapReached)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;

    /// Surface that grows by `step` per measurement, forever.
    struct GrowingSurface {
        size: AtomicU64,
        step: u64,
        measured: AtomicUsize,
    }

    impl GrowingSurface {
        fn new(step: u64) -> Self {
            Self {
                size: AtomicU64::new(0),
                step,
                measured: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GrowthSurface for GrowingSurface {
        async fn measure(&self) -> Result<u64> {
            self.measured.fetch_add(1, Ordering::SeqCst);
            Ok(self.size.fetch_add(self.step, Ordering::SeqCst))
        }

        async fn load_more(&self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_config(max_rounds: usize) -> ScrollConfig {
        ScrollConfig {
            max_rounds,
            settle: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_cap_bounds_forever_growing_surface() {
        let surface = GrowingSurface::new(100);
        let controller = ScrollController::new(fast_config(7));

        let outcome = controller.run(&surface, || false).await.unwrap();

        assert_eq!(outcome, ScrollOutcome::CapReached);
        assert_eq!(surface.measured.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_converges_on_third_equal_measurement() {
        let surface = GrowingSurface::new(0); // constant size
        let controller = ScrollController::new(fast_config(50));

        let outcome = controller.run(&surface, || false).await.unwrap();

        assert_eq!(outcome, ScrollOutcome::Converged);
        assert_eq!(surface.measured.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_growth_resets_convergence_counter() {
        // Sizes: 0, 0, 5, 5, 5 - two flat reads, growth, then three flat.
        struct Scripted {
            sizes: Vec<u64>,
            next: AtomicUsize,
        }

        #[async_trait]
        impl GrowthSurface for Scripted {
            async fn measure(&self) -> Result<u64> {
                let i = self.next.fetch_add(1, Ordering::SeqCst);
                Ok(self.sizes[i.min(self.sizes.len() - 1)])
            }

            async fn load_more(&self) -> Result<()> {
                Ok(())
            }
        }

        let surface = Scripted {
            sizes: vec![0, 0, 5, 5, 5],
            next: AtomicUsize::new(0),
        };
        let controller = ScrollController::new(fast_config(50));

        let outcome = controller.run(&surface, || false).await.unwrap();

        assert_eq!(outcome, ScrollOutcome::Converged);
        assert_eq!(surface.next.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_satisfied_predicate_stops_before_measuring() {
        let surface = GrowingSurface::new(10);
        let controller = ScrollController::new(fast_config(50));

        let outcome = controller.run(&surface, || true).await.unwrap();

        assert_eq!(outcome, ScrollOutcome::TargetReached);
        assert_eq!(surface.measured.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_predicate_checked_each_round() {
        let surface = GrowingSurface::new(10);
        let controller = ScrollController::new(fast_config(50));
        let rounds = AtomicUsize::new(0);

        let outcome = controller
            .run(&surface, || rounds.fetch_add(1, Ordering::SeqCst) >= 3)
            .await
            .unwrap();

        assert_eq!(outcome, ScrollOutcome::TargetReached);
        assert_eq!(surface.measured.load(Ordering::SeqCst), 3);
    }
}
