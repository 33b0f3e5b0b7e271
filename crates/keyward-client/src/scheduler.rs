//! Periodic ratchet key rotation.
//!
//! A [`RotationScheduler`] is bound to exactly one engine instance. The timer
//! task owns the only extra reference to that engine, so dropping the
//! scheduler both cancels future firings and releases the engine.

use std::{sync::Arc, time::Duration};

use keyward_core::{Identity, RatchetEngine};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// Repeating key rotation timer.
///
/// The first rotation fires one full `interval` after [`start`](Self::start);
/// bootstrap has already rotated once synchronously. Failures are logged and
/// the timer keeps running.
pub struct RotationScheduler {
    task: JoinHandle<()>,
    interval: Duration,
}

impl RotationScheduler {
    /// Spawn the timer task on the current tokio runtime.
    ///
    /// `interval` must be non-zero; [`KeywardConfig::validate`] rejects a
    /// zero interval before any engine is built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    ///
    /// [`KeywardConfig::validate`]: crate::KeywardConfig::validate
    pub fn start(engine: Arc<dyn RatchetEngine>, interval: Duration, identity: Identity) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                tracing::debug!(identity = %identity, "key rotation started");
                match engine.rotate_keys().await {
                    Ok(log) => {
                        tracing::debug!(identity = %identity, %log, "key rotation succeeded");
                    },
                    Err(e) => {
                        tracing::error!(identity = %identity, error = %e, "key rotation failed");
                    },
                }
            }
        });

        Self { task, interval }
    }

    /// Configured rotation interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the timer task is still alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Weak,
        atomic::{AtomicBool, AtomicU32, Ordering},
    };

    use async_trait::async_trait;
    use keyward_core::{
        IdentityRecord, RatchetError, RatchetSession, ResetOutcome, RotationLog, Ticket,
    };

    use super::*;

    #[derive(Default)]
    struct CountingEngine {
        rotations: AtomicU32,
        fail: AtomicBool,
    }

    #[async_trait]
    impl RatchetEngine for CountingEngine {
        async fn reset(&self) -> Result<ResetOutcome, RatchetError> {
            Ok(ResetOutcome::Cleared)
        }

        async fn rotate_keys(&self) -> Result<RotationLog, RatchetError> {
            self.rotations.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RatchetError::Network("offline".into()));
            }
            Ok(RotationLog::default())
        }

        async fn start_session_as_sender(
            &self,
            receiver: &IdentityRecord,
        ) -> Result<Arc<dyn RatchetSession>, RatchetError> {
            Err(RatchetError::PeerKeysMissing(receiver.identity.clone()))
        }

        fn start_session_as_receiver(
            &self,
            sender: &IdentityRecord,
            _ticket: &Ticket,
        ) -> Result<Arc<dyn RatchetSession>, RatchetError> {
            Err(RatchetError::NoSuchSession(sender.identity.clone()))
        }

        fn existing_session(&self, _participant: &Identity) -> Option<Arc<dyn RatchetSession>> {
            None
        }

        fn delete_session(&self, participant: &Identity) -> Result<(), RatchetError> {
            Err(RatchetError::NoSuchSession(participant.clone()))
        }
    }

    const INTERVAL: Duration = Duration::from_secs(60);

    /// Let the timer task observe the advanced clock.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval() {
        let engine = Arc::new(CountingEngine::default());
        let scheduler = RotationScheduler::start(engine.clone(), INTERVAL, "alice".into());

        settle().await;
        assert_eq!(engine.rotations.load(Ordering::SeqCst), 0, "no immediate firing");

        time::advance(INTERVAL).await;
        settle().await;
        assert_eq!(engine.rotations.load(Ordering::SeqCst), 1);

        time::advance(INTERVAL).await;
        settle().await;
        assert_eq!(engine.rotations.load(Ordering::SeqCst), 2);

        assert!(scheduler.is_running());
        assert_eq!(scheduler.interval(), INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_timer() {
        let engine = Arc::new(CountingEngine::default());
        engine.fail.store(true, Ordering::SeqCst);
        let scheduler = RotationScheduler::start(engine.clone(), INTERVAL, "alice".into());

        for _ in 0..3 {
            time::advance(INTERVAL).await;
            settle().await;
        }

        assert_eq!(engine.rotations.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_firing_and_releases_engine() {
        let engine = Arc::new(CountingEngine::default());
        let weak: Weak<CountingEngine> = Arc::downgrade(&engine);
        let scheduler = RotationScheduler::start(engine.clone(), INTERVAL, "alice".into());

        time::advance(INTERVAL).await;
        settle().await;
        assert_eq!(engine.rotations.load(Ordering::SeqCst), 1);

        drop(scheduler);
        settle().await;

        time::advance(INTERVAL * 3).await;
        settle().await;
        assert_eq!(engine.rotations.load(Ordering::SeqCst), 1);

        drop(engine);
        assert!(weak.upgrade().is_none(), "aborted task must release the engine");
    }
}
