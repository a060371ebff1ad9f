// ── Cycle health tracking ──
//
// Counts consecutive non-progress cycles so the manager can decide when to
// rebuild the account session, and publishes a snapshot for observers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Point-in-time view of cycle health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Failed discoveries and zero-progress refresh passes in a row.
    pub consecutive_stalled_cycles: u32,
    pub discovery_failures: u64,
    pub refresh_passes: u64,
    pub session_rebuilds: u64,
    pub last_discovery: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_refresh_duration: Option<Duration>,
}

/// How a refresh pass bears on the stalled-cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassProgress {
    /// At least one read succeeded or a device answered its probe.
    Made,
    /// Every attempted device failed.
    Stalled,
    /// Nothing was attempted, or only offline devices answered as offline.
    Neutral,
}

pub(crate) struct HealthTracker {
    tx: watch::Sender<HealthSnapshot>,
}

impl HealthTracker {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(HealthSnapshot::default());
        Self { tx }
    }

    pub(crate) fn snapshot(&self) -> HealthSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn stalled(&self) -> u32 {
        self.tx.borrow().consecutive_stalled_cycles
    }

    pub(crate) fn discovery_succeeded(&self) {
        self.tx.send_modify(|h| {
            h.consecutive_stalled_cycles = 0;
            h.last_discovery = Some(Utc::now());
        });
    }

    /// Returns the stalled-cycle count after this failure.
    pub(crate) fn discovery_failed(&self) -> u32 {
        let mut stalled = 0;
        self.tx.send_modify(|h| {
            h.discovery_failures += 1;
            h.consecutive_stalled_cycles += 1;
            stalled = h.consecutive_stalled_cycles;
        });
        stalled
    }

    /// Returns the stalled-cycle count after this pass. A neutral pass
    /// leaves the count alone.
    pub(crate) fn refresh_completed(&self, elapsed: Duration, progress: PassProgress) -> u32 {
        let mut stalled = 0;
        self.tx.send_modify(|h| {
            h.refresh_passes += 1;
            h.last_refresh = Some(Utc::now());
            h.last_refresh_duration = Some(elapsed);
            match progress {
                PassProgress::Made => h.consecutive_stalled_cycles = 0,
                PassProgress::Stalled => h.consecutive_stalled_cycles += 1,
                PassProgress::Neutral => {}
            }
            stalled = h.consecutive_stalled_cycles;
        });
        stalled
    }

    pub(crate) fn session_rebuilt(&self) {
        self.tx.send_modify(|h| {
            h.session_rebuilds += 1;
            h.consecutive_stalled_cycles = 0;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_accumulate_until_progress() {
        let health = HealthTracker::new();
        assert_eq!(health.discovery_failed(), 1);
        assert_eq!(
            health.refresh_completed(Duration::from_millis(5), PassProgress::Stalled),
            2
        );
        assert_eq!(health.stalled(), 2);

        assert_eq!(
            health.refresh_completed(Duration::from_millis(5), PassProgress::Made),
            0
        );
        let snap = health.snapshot();
        assert_eq!(snap.discovery_failures, 1);
        assert_eq!(snap.refresh_passes, 2);
        assert_eq!(snap.last_refresh_duration, Some(Duration::from_millis(5)));
    }

    #[test]
    fn neutral_pass_keeps_discovery_stalls() {
        let health = HealthTracker::new();
        health.discovery_failed();
        health.discovery_failed();
        assert_eq!(
            health.refresh_completed(Duration::from_millis(1), PassProgress::Neutral),
            2
        );
        assert_eq!(health.snapshot().refresh_passes, 1);
    }

    #[test]
    fn rebuild_resets_counter() {
        let health = HealthTracker::new();
        health.discovery_failed();
        health.discovery_failed();
        health.session_rebuilt();
        assert_eq!(health.stalled(), 0);
        assert_eq!(health.snapshot().session_rebuilds, 1);
    }

    #[test]
    fn successful_discovery_resets_counter() {
        let health = HealthTracker::new();
        health.discovery_failed();
        health.discovery_succeeded();
        assert_eq!(health.stalled(), 0);
        assert!(health.snapshot().last_discovery.is_some());
    }
}
