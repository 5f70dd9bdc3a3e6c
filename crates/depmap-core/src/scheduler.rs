//! Bounded task scheduler for filesystem walks.
//!
//! A walk is a dynamically growing set of units. Each unit performs one
//! filesystem operation and resolves to a [`Step`]: the values it contributes
//! and the follow-up units it discovered. The scheduler keeps at most
//! `ceiling` units in flight, parks the rest in a backlog, folds contributions
//! into a single accumulator and returns it once nothing is in flight and the
//! backlog is empty.
//!
//! A unit's future resolves exactly once, so a unit cannot report completion
//! twice. The first error ends the run; units still in flight are dropped.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

/// Default ceiling on concurrently outstanding filesystem operations.
///
/// Keeps large trees from exhausting open file handle limits.
pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 20;

/// One unit of work.
pub type Unit<T, E> = BoxFuture<'static, Result<Step<T, E>, E>>;

/// Outcome of a completed unit.
pub struct Step<T, E> {
    emitted: Vec<T>,
    spawned: Vec<Unit<T, E>>,
}

impl<T, E> Default for Step<T, E> {
    fn default() -> Self {
        Self {
            emitted: Vec::new(),
            spawned: Vec::new(),
        }
    }
}

impl<T, E> Step<T, E> {
    /// A step with no contribution and no follow-up work.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Contribute a value to the accumulator.
    #[must_use]
    pub fn emit(mut self, value: T) -> Self {
        self.emitted.push(value);
        self
    }

    /// Schedule a follow-up unit.
    #[must_use]
    pub fn spawn(mut self, unit: Unit<T, E>) -> Self {
        self.spawned.push(unit);
        self
    }

    /// Schedule several follow-up units.
    #[must_use]
    pub fn spawn_all(mut self, units: impl IntoIterator<Item = Unit<T, E>>) -> Self {
        self.spawned.extend(units);
        self
    }

    /// Combine two steps into one.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.emitted.extend(other.emitted);
        self.spawned.extend(other.spawned);
        self
    }
}

impl<T, E> std::fmt::Debug for Step<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("emitted", &self.emitted.len())
            .field("spawned", &self.spawned.len())
            .finish()
    }
}

/// Bookkeeping collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Units that completed successfully.
    pub units_completed: usize,
    /// Highest number of units in flight at once.
    pub max_in_flight: usize,
    /// Highest number of units waiting in the backlog at once.
    pub max_backlog: usize,
}

/// Runs units with a fixed concurrency ceiling.
///
/// A scheduler holds no state between runs; every [`Scheduler::run`] call
/// owns its own in-flight set, backlog and accumulator.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    ceiling: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL_TASKS)
    }
}

impl Scheduler {
    /// Create a scheduler. A ceiling of zero is treated as one.
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Run `seed` and everything it spawns, folding emitted values into `init`.
    pub async fn run<T, E, A>(
        &self,
        seed: Unit<T, E>,
        init: A,
        fold: impl FnMut(&mut A, T),
    ) -> Result<A, E> {
        self.run_with_stats(seed, init, fold)
            .await
            .map(|(acc, _)| acc)
    }

    /// Like [`Scheduler::run`], also returning [`RunStats`].
    pub async fn run_with_stats<T, E, A>(
        &self,
        seed: Unit<T, E>,
        init: A,
        mut fold: impl FnMut(&mut A, T),
    ) -> Result<(A, RunStats), E> {
        let mut acc = init;
        let mut stats = RunStats::default();
        let mut in_flight = FuturesUnordered::new();
        // Drained last-in-first-out, which keeps the walk close to depth-first
        // and the backlog short.
        let mut backlog: Vec<Unit<T, E>> = Vec::new();

        in_flight.push(seed);
        stats.max_in_flight = 1;

        while let Some(completed) = in_flight.next().await {
            let step = completed?;
            stats.units_completed += 1;

            for value in step.emitted {
                fold(&mut acc, value);
            }

            for unit in step.spawned {
                if in_flight.len() < self.ceiling {
                    in_flight.push(unit);
                } else {
                    backlog.push(unit);
                }
            }
            stats.max_backlog = stats.max_backlog.max(backlog.len());

            while in_flight.len() < self.ceiling {
                let Some(unit) = backlog.pop() else {
                    break;
                };
                in_flight.push(unit);
            }
            stats.max_in_flight = stats.max_in_flight.max(in_flight.len());
        }

        // An empty in-flight set implies an empty backlog: slots are refilled
        // from the backlog after every completion.
        debug_assert!(backlog.is_empty());
        Ok((acc, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type TestUnit = Unit<u32, String>;

    fn leaf(value: u32) -> TestUnit {
        async move { Ok(Step::empty().emit(value)) }.boxed()
    }

    #[tokio::test]
    async fn test_seed_only() {
        let sum = Scheduler::default()
            .run(leaf(7), 0u32, |acc, v| *acc += v)
            .await
            .unwrap();
        assert_eq!(sum, 7);
    }

    #[tokio::test]
    async fn test_empty_run_resolves() {
        let seed: TestUnit = async { Ok(Step::empty()) }.boxed();
        let values: Vec<u32> = Scheduler::default()
            .run(seed, Vec::new(), |acc, v| acc.push(v))
            .await
            .unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_nested_spawns_all_complete() {
        fn tree(depth: u32) -> TestUnit {
            async move {
                let step = Step::empty().emit(1);
                if depth == 0 {
                    Ok(step)
                } else {
                    Ok(step.spawn(tree(depth - 1)).spawn(tree(depth - 1)))
                }
            }
            .boxed()
        }

        // A full binary tree of depth 5 has 63 nodes.
        let (count, stats) = Scheduler::new(3)
            .run_with_stats(tree(5), 0u32, |acc, v| *acc += v)
            .await
            .unwrap();
        assert_eq!(count, 63);
        assert_eq!(stats.units_completed, 63);
        assert!(stats.max_in_flight <= 3);
    }

    #[tokio::test]
    async fn test_backlog_is_lifo() {
        let seed: TestUnit =
            async { Ok(Step::empty().spawn_all([leaf(1), leaf(2), leaf(3), leaf(4)])) }.boxed();

        let (order, stats) = Scheduler::new(1)
            .run_with_stats(seed, Vec::new(), |acc: &mut Vec<u32>, v| acc.push(v))
            .await
            .unwrap();
        // The first unit takes the free slot; the rest drain newest first.
        assert_eq!(order, vec![1, 4, 3, 2]);
        assert_eq!(stats.max_backlog, 3);
        assert_eq!(stats.max_in_flight, 1);
    }

    #[tokio::test]
    async fn test_ceiling_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units: Vec<TestUnit> = (0..50)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Step::empty().emit(i))
                }
                .boxed()
            })
            .collect();
        let seed: TestUnit = async move { Ok(Step::empty().spawn_all(units)) }.boxed();

        let values = Scheduler::new(4)
            .run(seed, Vec::new(), |acc: &mut Vec<u32>, v| acc.push(v))
            .await
            .unwrap();
        assert_eq!(values.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let failing: TestUnit = async { Err("boom".to_string()) }.boxed();
        let slow: TestUnit = async {
            tokio::task::yield_now().await;
            Err("later".to_string())
        }
        .boxed();
        let seed: TestUnit =
            async move { Ok(Step::empty().spawn(slow).spawn(failing).spawn(leaf(1))) }.boxed();

        let err = Scheduler::new(5)
            .run(seed, 0u32, |acc, v| *acc += v)
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_clamped() {
        let scheduler = Scheduler::new(0);
        assert_eq!(scheduler.ceiling(), 1);
        let value = scheduler.run(leaf(2), 0u32, |acc, v| *acc += v).await.unwrap();
        assert_eq!(value, 2);
    }
}
