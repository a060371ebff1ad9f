// ── Discovery / reconciliation cycle ──
//
// Diffs the account's device list against the registry: admits new
// devices, re-sessions known ones whose proxy went stale, and removes
// devices that stayed missing past the grace period.

use std::collections::HashSet;
use std::sync::Arc;

use plugsync_api::{DeviceId, DeviceSession, DeviceSummary};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::manager::Manager;
use crate::model::{Capabilities, DeviceRecord, EntityChange};

/// Outcome of one successful discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub discovered: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
    pub resessioned: Vec<DeviceId>,
    /// Registry size after the pass.
    pub total: usize,
}

impl Manager {
    /// Run one discovery pass.
    ///
    /// If the device list cannot be fetched the pass is aborted and the
    /// registry is left exactly as it was. Rejected credentials halt the
    /// manager.
    pub async fn discover(&self) -> Result<DiscoveryReport, CoreError> {
        let _gate = self.inner.discovery_gate.lock().await;

        let summaries = match self
            .remote_call(self.inner.account.list_devices())
            .await
        {
            Ok(summaries) => summaries,
            Err(e) if e.is_auth_failure() => {
                self.halt(&e).await;
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "discovery failed; registry left unchanged");
                let stalled = self.inner.health.discovery_failed();
                self.on_stalled_cycle(stalled).await;
                return Err(e);
            }
        };
        self.inner.health.discovery_succeeded();

        let mut report = DiscoveryReport::default();
        let listed: HashSet<&DeviceId> = summaries.iter().map(|s| &s.id).collect();

        for summary in &summaries {
            match self.inner.registry.get(summary.id.as_str()) {
                Some(existing) => {
                    if self.reconcile(&existing, summary).await {
                        report.resessioned.push(summary.id.clone());
                    }
                }
                None => {
                    self.admit(summary).await;
                    report.discovered.push(summary.id.clone());
                }
            }
        }

        // Removals only after the whole list has been processed.
        for id in self.inner.registry.list_ids() {
            if listed.contains(&id) {
                continue;
            }
            if self.mark_missing(&id) {
                report.removed.push(id);
            }
        }

        report.total = self.inner.registry.len();
        if report.discovered.is_empty() && report.removed.is_empty() {
            debug!(total = report.total, "discovery pass: no membership change");
        } else {
            info!(
                discovered = report.discovered.len(),
                removed = report.removed.len(),
                total = report.total,
                "discovery pass complete"
            );
        }
        Ok(report)
    }

    /// Insert a first-seen device, then announce it.
    async fn admit(&self, summary: &DeviceSummary) {
        let mut record = DeviceRecord::from_summary(summary);

        if let Some(proxy) = self.open_session(&summary.id).await {
            if summary.online {
                match self.probe(proxy.as_ref()).await {
                    Ok(caps) => record.apply_capabilities(caps),
                    Err(e) => {
                        warn!(device = %summary.id, error = %e, "capability probe failed; will retry");
                    }
                }
            }
            record.proxy = Some(proxy);
        }

        debug!(
            device = %record.id,
            name = %record.display_name,
            channels = record.channel_count,
            telemetry = record.supports_telemetry,
            "device admitted"
        );
        self.inner.registry.upsert(record);
        self.notify(EntityChange::DeviceDiscovered {
            device_id: summary.id.clone(),
        });
    }

    /// Bring a known device in line with the latest listing. Returns `true`
    /// if its proxy was replaced.
    async fn reconcile(&self, existing: &DeviceRecord, summary: &DeviceSummary) -> bool {
        let new_proxy = if existing.has_live_session() {
            None
        } else {
            self.open_session(&summary.id).await
        };

        let caps = if summary.online && !existing.probed {
            let proxy = new_proxy.as_ref().or(existing.proxy.as_ref());
            match proxy {
                Some(proxy) => self.probe(proxy.as_ref()).await.ok(),
                None => None,
            }
        } else {
            None
        };

        let resessioned = new_proxy.is_some();
        self.inner.registry.update(summary.id.as_str(), |record| {
            record.missed_discoveries = 0;
            if summary.online && !record.available {
                record.consecutive_failed_passes = 0;
            }
            record.available = summary.online;
            if let Some(proxy) = new_proxy {
                record.proxy = Some(proxy);
            }
            if let Some(caps) = caps {
                record.apply_capabilities(caps);
            }
        });

        if resessioned {
            debug!(device = %summary.id, "device session replaced");
        }
        resessioned
    }

    /// Count a missed listing. Returns `true` if the device was removed.
    fn mark_missing(&self, id: &DeviceId) -> bool {
        let grace = self.inner.config.removal_grace_passes;
        let Some(expired) = self.inner.registry.update(id.as_str(), |record| {
            record.missed_discoveries += 1;
            record.missed_discoveries >= grace
        }) else {
            return false;
        };
        if !expired {
            debug!(device = %id, "device missing from listing; within grace");
            return false;
        }

        let announced = self
            .inner
            .registry
            .get(id.as_str())
            .map(|r| r.registered_entity_ids.clone())
            .unwrap_or_default();
        self.notify(EntityChange::DeviceRemoved {
            device_id: id.clone(),
            entity_ids: announced.clone(),
        });

        let registered = self.inner.registry.remove(id.as_str()).unwrap_or_default();
        // Entities registered while the removal was being announced.
        let late: Vec<String> = registered
            .into_iter()
            .filter(|e| !announced.contains(e))
            .collect();
        if !late.is_empty() {
            self.notify(EntityChange::DeviceRemoved {
                device_id: id.clone(),
                entity_ids: late,
            });
        }

        info!(device = %id, "device removed");
        true
    }

    async fn open_session(&self, id: &DeviceId) -> Option<Arc<dyn DeviceSession>> {
        match self.remote_call(self.inner.account.open_session(id)).await {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                warn!(device = %id, error = %e, "could not open device session");
                None
            }
        }
    }

    async fn probe(&self, proxy: &dyn DeviceSession) -> Result<Capabilities, CoreError> {
        let channel_count = self.remote_call(proxy.get_channel_count()).await?;
        let usb_channel = self.remote_call(proxy.usb_channel_index()).await?;
        let telemetry = self.remote_call(proxy.supports_telemetry()).await?;
        Ok(Capabilities::from_probe(channel_count, usb_channel, telemetry))
    }
}
