//! Oracle Availability Tracker
//!
//! Remembers whether the classifier last answered its readiness probe.
//! There is no background polling: the state only moves when someone probes
//! or when a prediction fails.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::oracle::ClassifierOracle;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Unknown,
    Available,
    Unavailable,
}

/// Why the most recent probe did not report ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    Timeout,
    Transport,
    NotReady,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthSnapshot {
    pub state: ServiceHealth,
    pub last_checked: Option<DateTime<Utc>>,
    /// Cleared by a successful probe. Demotions after failed predictions leave it alone.
    pub last_failure: Option<ProbeFailure>,
}

pub struct AvailabilityTracker {
    oracle: Arc<dyn ClassifierOracle>,
    state: RwLock<HealthSnapshot>,
    probe_timeout: Duration,
}

impl AvailabilityTracker {
    pub fn new(oracle: Arc<dyn ClassifierOracle>) -> Self {
        Self::with_probe_timeout(oracle, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_probe_timeout(oracle: Arc<dyn ClassifierOracle>, probe_timeout: Duration) -> Self {
        Self {
            oracle,
            state: RwLock::new(HealthSnapshot {
                state: ServiceHealth::Unknown,
                last_checked: None,
                last_failure: None,
            }),
            probe_timeout,
        }
    }

    /// Probe the oracle once, bounded by the probe timeout, and record the result.
    ///
    /// Timeouts, transport failures and "not ready" answers all read as `false`;
    /// the snapshot keeps which one it was.
    pub async fn check_health(&self) -> bool {
        let failure = match tokio::time::timeout(self.probe_timeout, self.oracle.health()).await {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some(ProbeFailure::NotReady),
            Ok(Err(e)) => {
                warn!("Health probe against {} failed: {}", self.oracle.name(), e);
                Some(ProbeFailure::Transport)
            }
            Err(_) => {
                warn!(
                    "Health probe against {} timed out after {:?}",
                    self.oracle.name(),
                    self.probe_timeout
                );
                Some(ProbeFailure::Timeout)
            }
        };

        let ready = failure.is_none();
        let next = if ready {
            ServiceHealth::Available
        } else {
            ServiceHealth::Unavailable
        };

        let mut state = self.state.write().await;
        if state.state != next {
            info!("Oracle {} is now {:?}", self.oracle.name(), next);
        }
        state.state = next;
        state.last_checked = Some(Utc::now());
        state.last_failure = failure;
        ready
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Last known state. `Unknown` counts as unavailable.
    pub async fn is_available(&self) -> bool {
        self.state.read().await.state == ServiceHealth::Available
    }

    pub async fn mark_unavailable(&self) {
        let mut state = self.state.write().await;
        if state.state != ServiceHealth::Unavailable {
            debug!("Demoting oracle {} to unavailable", self.oracle.name());
        }
        state.state = ServiceHealth::Unavailable;
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        *self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ImageRef, OracleError, RawScores};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ProbeOracle {
        ready: AtomicBool,
        hang: bool,
    }

    #[async_trait]
    impl ClassifierOracle for ProbeOracle {
        fn name(&self) -> &str {
            "probe"
        }

        async fn health(&self) -> Result<bool, OracleError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(self.ready.load(Ordering::SeqCst))
        }

        async fn classify(&self, _image: &ImageRef) -> Result<RawScores, OracleError> {
            Err(OracleError::Backend("not used".into()))
        }
    }

    fn tracker(ready: bool, hang: bool) -> (AvailabilityTracker, Arc<ProbeOracle>) {
        let oracle = Arc::new(ProbeOracle {
            ready: AtomicBool::new(ready),
            hang,
        });
        (AvailabilityTracker::new(oracle.clone()), oracle)
    }

    #[tokio::test]
    async fn test_unknown_reads_as_unavailable() {
        let (tracker, _) = tracker(true, false);
        assert!(!tracker.is_available().await);
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.state, ServiceHealth::Unknown);
        assert!(snapshot.last_checked.is_none());
    }

    #[tokio::test]
    async fn test_probe_transitions() {
        let (tracker, oracle) = tracker(false, false);
        assert!(!tracker.check_health().await);
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.state, ServiceHealth::Unavailable);
        assert_eq!(snapshot.last_failure, Some(ProbeFailure::NotReady));

        oracle.ready.store(true, Ordering::SeqCst);
        assert!(tracker.check_health().await);
        assert!(tracker.is_available().await);
        let snapshot = tracker.snapshot().await;
        assert!(snapshot.last_checked.is_some());
        assert!(snapshot.last_failure.is_none());

        tracker.mark_unavailable().await;
        assert!(!tracker.is_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out() {
        let (tracker, _) = tracker(true, true);
        assert!(!tracker.check_health().await);
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.state, ServiceHealth::Unavailable);
        assert_eq!(snapshot.last_failure, Some(ProbeFailure::Timeout));
    }
}
