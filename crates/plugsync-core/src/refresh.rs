// ── Status refresh cycle ──
//
// Re-reads channel state and telemetry for every available device. Each
// read is independent: a failed or timed-out call is logged and skipped,
// never aborting the rest of the device or the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use plugsync_api::DeviceSession;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::health::PassProgress;
use crate::manager::Manager;
use crate::model::DeviceRecord;

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Devices that got full channel/telemetry reads.
    pub devices_polled: usize,
    /// Unavailable devices that only got a reachability probe.
    pub devices_probed: usize,
    /// Devices skipped for lack of a live session.
    pub skipped: usize,
    pub reads_ok: usize,
    pub reads_failed: usize,
    pub elapsed: Duration,
    /// The pass took at least as long as the refresh interval.
    pub overran: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceOutcome {
    Polled { ok: usize, failed: usize },
    Probed { online: bool, failed: bool },
    Skipped,
}

impl DeviceOutcome {
    /// Nothing useful came back from this device in this pass.
    fn is_down(self) -> bool {
        match self {
            Self::Polled { ok, .. } => ok == 0,
            Self::Probed { online, .. } => !online,
            Self::Skipped => true,
        }
    }
}

impl Manager {
    /// Run one refresh pass. Never fails; per-read failures are counted in
    /// the report.
    pub async fn refresh(&self) -> RefreshReport {
        let _gate = self.inner.refresh_gate.lock().await;
        let started = Instant::now();

        let records = self.inner.registry.snapshot();
        let outcomes = join_all(
            records
                .iter()
                .map(|record| self.refresh_device(Arc::clone(record))),
        )
        .await;

        let mut report = RefreshReport::default();
        for outcome in &outcomes {
            match *outcome {
                DeviceOutcome::Polled { ok, failed } => {
                    report.devices_polled += 1;
                    report.reads_ok += ok;
                    report.reads_failed += failed;
                }
                DeviceOutcome::Probed { failed, .. } => {
                    report.devices_probed += 1;
                    if failed {
                        report.reads_failed += 1;
                    }
                }
                DeviceOutcome::Skipped => report.skipped += 1,
            }
        }
        report.elapsed = started.elapsed();

        let interval = self.inner.config.status_refresh_interval;
        report.overran = report.elapsed >= interval;
        if report.overran {
            warn!(
                elapsed_ms = report.elapsed.as_millis(),
                interval_ms = interval.as_millis(),
                "refresh pass took as long as the refresh interval"
            );
        }

        let all_down = !outcomes.is_empty() && outcomes.iter().all(|o| o.is_down());
        if all_down {
            info!(devices = outcomes.len(), "every device unavailable or inactive; scheduling discovery");
            self.trigger_discovery();
        }

        let progress = if outcomes.iter().any(|o| !o.is_down()) {
            PassProgress::Made
        } else if all_down && report.reads_failed + report.skipped > 0 {
            PassProgress::Stalled
        } else {
            // Empty registry, or offline devices that answered as offline.
            PassProgress::Neutral
        };
        let count = self.inner.health.refresh_completed(report.elapsed, progress);
        if progress == PassProgress::Stalled {
            self.on_stalled_cycle(count).await;
        }

        debug!(?report, "refresh pass complete");
        report
    }

    async fn refresh_device(&self, record: Arc<DeviceRecord>) -> DeviceOutcome {
        let proxy = match &record.proxy {
            Some(proxy) if proxy.is_active() => Arc::clone(proxy),
            _ => {
                debug!(device = %record.id, "no live session; skipping");
                return DeviceOutcome::Skipped;
            }
        };

        if record.available {
            self.read_device(&record, proxy.as_ref()).await
        } else {
            self.probe_device(&record, proxy.as_ref()).await
        }
    }

    /// Full read: every channel in ascending order, then telemetry.
    async fn read_device(&self, record: &DeviceRecord, proxy: &dyn DeviceSession) -> DeviceOutcome {
        let id = record.id.as_str();
        let mut ok = 0;
        let mut failed = 0;

        for channel in 0..record.channel_count {
            match self.remote_call(proxy.get_channel_state(channel)).await {
                Ok(on) => {
                    self.inner.registry.update(id, |r| r.set_channel(channel, on));
                    ok += 1;
                }
                Err(e) => {
                    warn!(device = %record.id, channel, error = %e, "channel read failed");
                    failed += 1;
                }
            }
        }

        if record.supports_telemetry {
            match self.remote_call(proxy.get_telemetry()).await {
                Ok(readings) => {
                    self.inner.registry.update(id, |r| r.telemetry.extend(readings));
                    ok += 1;
                }
                Err(e) => {
                    warn!(device = %record.id, error = %e, "telemetry read failed");
                    failed += 1;
                }
            }
        }

        let threshold = self.inner.config.unavailable_after_failed_passes;
        let went_unavailable = self.inner.registry.update(id, |r| {
            if ok > 0 {
                r.consecutive_failed_passes = 0;
                r.last_refreshed = Some(Utc::now());
                return false;
            }
            r.consecutive_failed_passes += 1;
            if r.available && r.consecutive_failed_passes >= threshold {
                r.mark_unavailable();
                return true;
            }
            false
        });
        if went_unavailable == Some(true) {
            warn!(device = %record.id, passes = threshold, "every read failed repeatedly; marking unavailable");
        }

        DeviceOutcome::Polled { ok, failed }
    }

    /// Lightweight reachability probe for an unavailable device.
    async fn probe_device(&self, record: &DeviceRecord, proxy: &dyn DeviceSession) -> DeviceOutcome {
        match self.remote_call(proxy.is_online()).await {
            Ok(true) => {
                self.inner.registry.update(record.id.as_str(), |r| {
                    r.available = true;
                    r.consecutive_failed_passes = 0;
                });
                info!(device = %record.id, "device reachable again");
                DeviceOutcome::Probed {
                    online: true,
                    failed: false,
                }
            }
            Ok(false) => DeviceOutcome::Probed {
                online: false,
                failed: false,
            },
            Err(e) => {
                debug!(device = %record.id, error = %e, "reachability probe failed");
                DeviceOutcome::Probed {
                    online: false,
                    failed: true,
                }
            }
        }
    }
}
