// ── Push event listener ──
//
// Applies push notifications to the registry synchronously. Anything that
// needs a remote call is handed to the discovery task via its trigger,
// never run inline, so the event source is never blocked.

use plugsync_api::PushEvent;
use tracing::{debug, info, warn};

use crate::manager::Manager;

/// What applying one push event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The registry was updated.
    Applied,
    /// An out-of-band discovery pass was requested.
    DiscoveryTriggered,
    /// Nothing to do (unknown device, out-of-range channel, informational).
    Ignored,
}

impl Manager {
    /// Apply one push event to the registry.
    pub fn apply_push_event(&self, event: &PushEvent) -> PushOutcome {
        match event {
            PushEvent::ConnectionStateChanged { connected } => {
                if *connected {
                    info!("push channel connected");
                } else {
                    warn!("push channel disconnected; relying on polling");
                }
                PushOutcome::Ignored
            }

            PushEvent::DeviceOnlineStatusChanged { device_id, online } => {
                let online = *online;
                let session = self.inner.registry.update(device_id.as_str(), |r| {
                    r.available = online;
                    if online {
                        r.consecutive_failed_passes = 0;
                    }
                    (r.has_live_session(), r.probed)
                });

                match session {
                    Some((true, false)) if online => {
                        // Admitted while offline, so capabilities are still unknown.
                        debug!(device = %device_id, "device online but never probed; scheduling discovery");
                        self.trigger_discovery();
                        PushOutcome::DiscoveryTriggered
                    }
                    Some((true, _)) => {
                        debug!(device = %device_id, online, "availability updated from push");
                        PushOutcome::Applied
                    }
                    Some((false, _)) if online => {
                        debug!(device = %device_id, "device online without a live session");
                        self.trigger_discovery();
                        PushOutcome::DiscoveryTriggered
                    }
                    Some((false, _)) => PushOutcome::Applied,
                    None if online => {
                        info!(device = %device_id, "unknown device came online; scheduling discovery");
                        self.trigger_discovery();
                        PushOutcome::DiscoveryTriggered
                    }
                    None => PushOutcome::Ignored,
                }
            }

            PushEvent::ChannelStateChanged {
                device_id,
                channel,
                on,
            } => {
                let applied = self
                    .inner
                    .registry
                    .update(device_id.as_str(), |r| r.set_channel(*channel, *on));

                match applied {
                    Some(true) => {
                        debug!(device = %device_id, channel, on, "channel state updated from push");
                        PushOutcome::Applied
                    }
                    Some(false) => {
                        debug!(device = %device_id, channel, "push for out-of-range channel ignored");
                        PushOutcome::Ignored
                    }
                    None => PushOutcome::Ignored,
                }
            }
        }
    }
}
