//! Background retraining: pull the source, train off the async workers,
//! install into the slot. At most one pass is in flight at any time.

use crate::slot::ModelSlot;
use crate::source::InteractionSource;
use crate::trainer::Trainer;
use flrec_core::error::RecError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Retrainer state machine:
/// `Idle -> Training -> {InstallSuccess | InstallFailure} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainState {
    Idle,
    Training,
    InstallSuccess,
    InstallFailure,
}

#[derive(Debug)]
pub enum RetrainOutcome {
    Installed { generation: u64 },
    /// The pass ran but produced nothing installable; the previous snapshot stays.
    Failed(RecError),
    /// Another pass was still running.
    Skipped,
}

/// Counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrainStats {
    pub installed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Everything a pass touches. Owned by the blocking task while it runs, so a
/// pass finishes and records its outcome even if the caller stops waiting.
struct Shared {
    source: Arc<dyn InteractionSource>,
    trainer: Arc<Trainer>,
    slot: Arc<ModelSlot>,
    in_flight: AtomicBool,
    state: Mutex<RetrainState>,
    installed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

pub struct Retrainer {
    shared: Arc<Shared>,
    interval: Duration,
    created_at: Instant,
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn set_state(&self, state: RetrainState) {
        *self.state.lock() = state;
    }

    /// Load, train and install on the current thread.
    fn run_pass(&self) -> RetrainOutcome {
        self.set_state(RetrainState::Training);
        info!(source = %self.source.describe(), kind = %self.trainer.kind(), "Retrain started");
        let start = Instant::now();

        let result = self
            .source
            .load()
            .and_then(|records| self.trainer.train(&records))
            .and_then(|snapshot| self.slot.replace(snapshot));
        metrics::histogram!("flrec.retrain.duration_ms").record(start.elapsed().as_millis() as f64);

        let outcome = match result {
            Ok(generation) => {
                self.set_state(RetrainState::InstallSuccess);
                self.installed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("flrec.retrain.installed").increment(1);
                metrics::gauge!("flrec.model.generation").set(generation as f64);
                info!(
                    generation = generation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Retrain installed new snapshot"
                );
                RetrainOutcome::Installed { generation }
            }
            Err(e) => self.record_failure(e),
        };

        self.set_state(RetrainState::Idle);
        outcome
    }

    fn record_failure(&self, e: RecError) -> RetrainOutcome {
        self.set_state(RetrainState::InstallFailure);
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("flrec.retrain.failed", "reason" => e.code()).increment(1);
        error!(error = %e, "Retrain failed, keeping previous snapshot");
        RetrainOutcome::Failed(e)
    }
}

impl Retrainer {
    /// The periodic schedule is anchored here: the first tick lands one
    /// `interval` after construction, however long the first pass takes.
    pub fn new(
        source: Arc<dyn InteractionSource>,
        trainer: Arc<Trainer>,
        slot: Arc<ModelSlot>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                trainer,
                slot,
                in_flight: AtomicBool::new(false),
                state: Mutex::new(RetrainState::Idle),
                installed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            interval,
            created_at: Instant::now(),
        }
    }

    pub fn state(&self) -> RetrainState {
        *self.shared.state.lock()
    }

    pub fn stats(&self) -> RetrainStats {
        RetrainStats {
            installed: self.shared.installed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
        }
    }

    /// When the schedule started by [`spawn`](Self::spawn) fires first.
    pub fn first_tick(&self) -> Instant {
        self.created_at + self.interval
    }

    /// Run one full retrain pass unless one is already running.
    ///
    /// The pass runs on the blocking pool and holds the in-flight flag until
    /// it has installed or failed; dropping the returned future does not end
    /// it early.
    pub async fn run_once(&self) -> RetrainOutcome {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Retrain already in flight, skipping tick");
            self.shared.skipped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("flrec.retrain.skipped").increment(1);
            return RetrainOutcome::Skipped;
        }

        let shared = self.shared.clone();
        let pass = tokio::task::spawn_blocking(move || {
            let _in_flight = InFlight(&shared.in_flight);
            shared.run_pass()
        });

        match pass.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let outcome = self.shared.record_failure(RecError::Internal(
                    anyhow::Error::new(e).context("retrain task aborted"),
                ));
                self.shared.set_state(RetrainState::Idle);
                outcome
            }
        }
    }

    /// Fire `run_once` every `interval`, starting at [`first_tick`](Self::first_tick).
    /// Ticks that land while a pass is running are skipped.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::from_std(self.first_tick()),
                self.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Retrain schedule started");

            loop {
                ticker.tick().await;
                let this = self.clone();
                tokio::spawn(async move {
                    if let RetrainOutcome::Skipped = this.run_once().await {
                        warn!("Retrain tick skipped: previous pass still running");
                    }
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use flrec_core::config::ModelConfig;
    use flrec_core::error::RecResult;
    use flrec_core::types::RawInteraction;

    fn log() -> Vec<RawInteraction> {
        vec![
            RawInteraction::new("a", "u1", 3),
            RawInteraction::new("b", "u1", 1),
            RawInteraction::new("a", "u2", 5),
        ]
    }

    fn trainer() -> Arc<Trainer> {
        Arc::new(Trainer::new(&ModelConfig {
            factors: 2,
            iterations: 2,
            ..ModelConfig::default()
        }))
    }

    /// Source that blocks for a while before answering.
    struct SlowSource {
        delay: Duration,
        inner: MemorySource,
    }

    impl InteractionSource for SlowSource {
        fn load(&self) -> RecResult<Vec<RawInteraction>> {
            std::thread::sleep(self.delay);
            self.inner.load()
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn test_run_once_installs_snapshot() {
        let slot = Arc::new(ModelSlot::new());
        let retrainer = Retrainer::new(
            Arc::new(MemorySource::new(log())),
            trainer(),
            slot.clone(),
            Duration::from_secs(600),
        );

        assert!(matches!(
            retrainer.run_once().await,
            RetrainOutcome::Installed { generation: 1 }
        ));
        assert_eq!(retrainer.state(), RetrainState::Idle);
        assert_eq!(slot.read().unwrap().items().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_previous_snapshot() {
        let source = Arc::new(MemorySource::new(log()));
        let slot = Arc::new(ModelSlot::new());
        let retrainer = Retrainer::new(source.clone(), trainer(), slot.clone(), Duration::from_secs(600));

        retrainer.run_once().await;
        source.set_records(Vec::new());

        match retrainer.run_once().await {
            RetrainOutcome::Failed(RecError::DegenerateInput(_)) => {}
            other => panic!("expected degenerate input, got {other:?}"),
        }
        assert_eq!(slot.generation(), Some(1));
        assert_eq!(
            retrainer.stats(),
            RetrainStats {
                installed: 1,
                failed: 1,
                skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let source = Arc::new(SlowSource {
            delay: Duration::from_millis(200),
            inner: MemorySource::new(log()),
        });
        let slot = Arc::new(ModelSlot::new());
        let retrainer = Retrainer::new(source, trainer(), slot.clone(), Duration::from_secs(600));

        let (first, second) = tokio::join!(retrainer.run_once(), retrainer.run_once());
        assert!(matches!(first, RetrainOutcome::Installed { .. }));
        assert!(matches!(second, RetrainOutcome::Skipped));
        assert_eq!(slot.generation(), Some(1));

        // the flag is released once the pass ends
        assert!(matches!(
            retrainer.run_once().await,
            RetrainOutcome::Installed { generation: 2 }
        ));
    }

    #[tokio::test]
    async fn test_abandoned_caller_keeps_pass_exclusive() {
        let slot = Arc::new(ModelSlot::new());
        let retrainer = Retrainer::new(
            Arc::new(SlowSource {
                delay: Duration::from_millis(300),
                inner: MemorySource::new(log()),
            }),
            trainer(),
            slot.clone(),
            Duration::from_secs(600),
        );

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), retrainer.run_once()).await;
        assert!(abandoned.is_err());

        // the first pass is still training on the blocking pool
        assert!(matches!(retrainer.run_once().await, RetrainOutcome::Skipped));

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(Instant::now() < deadline, "pass never released the flag");
            match retrainer.run_once().await {
                RetrainOutcome::Installed { generation } => {
                    // the abandoned pass installed generation 1 on its own
                    assert_eq!(generation, 2);
                    break;
                }
                RetrainOutcome::Skipped => tokio::time::sleep(Duration::from_millis(10)).await,
                RetrainOutcome::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }
        assert_eq!(retrainer.stats().installed, 2);
    }

    #[test]
    fn test_first_tick_is_anchored_at_construction() {
        let before = Instant::now();
        let interval = Duration::from_secs(600);
        let retrainer = Retrainer::new(
            Arc::new(MemorySource::new(log())),
            trainer(),
            Arc::new(ModelSlot::new()),
            interval,
        );
        let first = retrainer.first_tick();
        assert!(first >= before + interval);

        // time spent before spawning (the eager pass) does not push it back
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(retrainer.first_tick(), first);
        assert!(first < Instant::now() + interval);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_schedule_keeps_retraining() {
        let slot = Arc::new(ModelSlot::new());
        let retrainer = Arc::new(Retrainer::new(
            Arc::new(MemorySource::new(log())),
            trainer(),
            slot.clone(),
            Duration::from_millis(20),
        ));
        let handle = retrainer.clone().spawn();

        let deadline = Instant::now() + Duration::from_secs(10);
        while slot.generation().unwrap_or(0) < 3 {
            assert!(Instant::now() < deadline, "schedule did not retrain");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
    }
}
