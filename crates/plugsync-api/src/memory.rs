//! In-memory account backend.
//!
//! [`MemoryAccount`] simulates a cloud account with a handful of plugs. It
//! backs the CLI's fixture mode and every lifecycle test in the workspace.
//!
//! Besides plain state it supports:
//!
//! - **Fault injection** per `(device, operation)` pair, either a returned
//!   [`Error`] or a call that never completes ([`Fault::Hang`]).
//! - **Session generations**: every `connect()` bumps the generation, and
//!   sessions opened under an older one report `is_active() == false`.
//! - **Push events** through a `broadcast` channel, emitted on online/offline
//!   transitions, button presses, and remote switching.
//! - **Call counters** so tests can assert which remote calls were made.
//!
//! # Fixture format
//!
//! ```toml
//! username = "user@example.com"
//! password = "hunter2"
//! push_events = true
//!
//! [[devices]]
//! id = "1811061234"
//! name = "Desk lamp (mss310)"
//! channels = [true]
//! telemetry = { power = 12000.0, current = 55.0, voltage = 2301.0 }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::error::Error;
use crate::models::{DeviceId, DeviceSummary, PushEvent, Telemetry};
use crate::session::{AccountClient, DeviceSession};

const PUSH_CHANNEL_CAPACITY: usize = 256;

// ── Fault injection ─────────────────────────────────────────────────

/// A remote operation that can be counted or faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    ListDevices,
    OpenSession,
    ChannelCount,
    UsbChannel,
    SupportsTelemetry,
    GetChannel(u32),
    SetChannel(u32),
    Telemetry,
    IsOnline,
}

/// How an injected fault manifests.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return this error immediately.
    Error(Error),
    /// Never complete. Only a caller-side timeout gets out of this.
    Hang,
}

type FaultKey = (Option<DeviceId>, Op);

// ── Simulated device ────────────────────────────────────────────────

/// State of one simulated plug.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimDevice {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_online")]
    pub online: bool,
    /// Physical on/off state per channel.
    #[serde(default = "default_channels")]
    pub channels: Vec<bool>,
    /// Channel count the device claims. Defaults to `channels.len()`.
    #[serde(default)]
    pub reported_channels: Option<u32>,
    #[serde(default)]
    pub usb_channel: Option<u32>,
    /// Present iff the device supports electricity readings.
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
}

fn default_online() -> bool {
    true
}

fn default_channels() -> Vec<bool> {
    vec![false]
}

impl SimDevice {
    /// An online plug with `channels` outputs, all off, no telemetry.
    pub fn plug(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            model: None,
            online: true,
            channels: vec![false; channels],
            reported_channels: None,
            usb_channel: None,
            telemetry: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_telemetry(mut self, power: f64, current: f64, voltage: f64) -> Self {
        self.telemetry = Some(Telemetry::from([
            ("power".to_owned(), power),
            ("current".to_owned(), current),
            ("voltage".to_owned(), voltage),
        ]));
        self
    }

    pub fn with_usb_channel(mut self, index: u32) -> Self {
        self.usb_channel = Some(index);
        self
    }

    /// Make the device misreport its channel count.
    pub fn reporting_channels(mut self, count: u32) -> Self {
        self.reported_channels = Some(count);
        self
    }

    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    fn channel_count(&self) -> u32 {
        self.reported_channels
            .unwrap_or_else(|| u32::try_from(self.channels.len()).unwrap_or(u32::MAX))
    }
}

// ── Fixture file ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Fixture {
    username: String,
    password: String,
    #[serde(default = "default_online")]
    push_events: bool,
    #[serde(default)]
    devices: Vec<FixtureDevice>,
}

#[derive(Debug, Deserialize)]
struct FixtureDevice {
    id: DeviceId,
    #[serde(flatten)]
    device: SimDevice,
}

// ── MemoryAccount ───────────────────────────────────────────────────

/// Simulated cloud account. Cheaply cloneable; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryAccount {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    username: String,
    password: SecretString,
    devices: DashMap<DeviceId, SimDevice>,
    faults: DashMap<FaultKey, Fault>,
    calls: DashMap<FaultKey, u64>,
    connected: AtomicBool,
    generation: AtomicU64,
    push_enabled: AtomicBool,
    push_tx: broadcast::Sender<Arc<PushEvent>>,
}

impl MemoryAccount {
    /// Empty account accepting exactly these credentials. Push events are on.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let (push_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                username: username.into(),
                password: SecretString::from(password.into()),
                devices: DashMap::new(),
                faults: DashMap::new(),
                calls: DashMap::new(),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                push_enabled: AtomicBool::new(true),
                push_tx,
            }),
        }
    }

    /// Parse a TOML fixture (see the module docs for the format).
    pub fn from_fixture_str(raw: &str) -> Result<Self, Error> {
        let fixture: Fixture = toml::from_str(raw).map_err(|e| Error::Fixture {
            message: e.to_string(),
        })?;
        let account = Self::new(fixture.username, fixture.password)
            .with_push_events(fixture.push_events);
        for entry in fixture.devices {
            account.add_device(entry.id, entry.device);
        }
        Ok(account)
    }

    /// Read and parse a TOML fixture file.
    pub fn from_fixture_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Fixture {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_fixture_str(&raw)
    }

    pub fn with_device(self, id: impl Into<DeviceId>, device: SimDevice) -> Self {
        self.add_device(id, device);
        self
    }

    pub fn with_push_events(self, enabled: bool) -> Self {
        self.inner.push_enabled.store(enabled, Ordering::SeqCst);
        self
    }

    // ── State manipulation ───────────────────────────────────────────

    pub fn add_device(&self, id: impl Into<DeviceId>, device: SimDevice) {
        self.inner.devices.insert(id.into(), device);
    }

    pub fn remove_device(&self, id: &str) -> Option<SimDevice> {
        self.inner.devices.remove(id).map(|(_, d)| d)
    }

    pub fn device(&self, id: &str) -> Option<SimDevice> {
        self.inner.devices.get(id).map(|d| d.value().clone())
    }

    /// Physical on/off state of one channel.
    pub fn channel_state(&self, id: &str, channel: u32) -> Option<bool> {
        let device = self.inner.devices.get(id)?;
        device.channels.get(channel_index(channel)).copied()
    }

    /// Flip a device's reachability and push the transition.
    pub fn set_online(&self, id: &str, online: bool) {
        let Some(mut device) = self.inner.devices.get_mut(id) else {
            return;
        };
        device.online = online;
        let device_id = device.key().clone();
        drop(device);
        self.emit(PushEvent::DeviceOnlineStatusChanged { device_id, online });
    }

    /// Simulate a manual button press: toggles the channel and pushes the
    /// new state. Returns the new state, or `None` for unknown channels.
    pub fn press_button(&self, id: &str, channel: u32) -> Option<bool> {
        let mut device = self.inner.devices.get_mut(id)?;
        let slot = device.channels.get_mut(channel_index(channel))?;
        *slot = !*slot;
        let on = *slot;
        let device_id = device.key().clone();
        drop(device);
        self.emit(PushEvent::ChannelStateChanged {
            device_id,
            channel,
            on,
        });
        Some(on)
    }

    pub fn set_telemetry(&self, id: &str, telemetry: Telemetry) {
        if let Some(mut device) = self.inner.devices.get_mut(id) {
            device.telemetry = Some(telemetry);
        }
    }

    /// Push an arbitrary event (no-op while push events are disabled).
    pub fn emit(&self, event: PushEvent) {
        if self.inner.push_enabled.load(Ordering::SeqCst) {
            // No receivers is fine.
            let _ = self.inner.push_tx.send(Arc::new(event));
        }
    }

    /// Invalidate every open device session without touching `connected`.
    pub fn invalidate_sessions(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    // ── Faults and counters ──────────────────────────────────────────

    pub fn inject(&self, device: Option<&str>, op: Op, fault: Fault) {
        self.inner.faults.insert((device.map(DeviceId::from), op), fault);
    }

    pub fn clear_fault(&self, device: Option<&str>, op: Op) {
        self.inner.faults.remove(&(device.map(DeviceId::from), op));
    }

    pub fn clear_faults(&self) {
        self.inner.faults.clear();
    }

    /// How many times `op` was attempted, faulted calls included.
    pub fn call_count(&self, device: Option<&str>, op: Op) -> u64 {
        self.inner
            .calls
            .get(&(device.map(DeviceId::from), op))
            .map_or(0, |c| *c)
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn gate(&self, device: Option<&DeviceId>, op: Op) -> Result<(), Error> {
        let key = (device.cloned(), op);
        *self.inner.calls.entry(key.clone()).or_insert(0) += 1;

        let fault = self.inner.faults.get(&key).map(|f| f.value().clone());
        match fault {
            Some(Fault::Error(err)) => Err(err),
            Some(Fault::Hang) => std::future::pending().await,
            None => Ok(()),
        }
    }

    fn require_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl AccountClient for MemoryAccount {
    async fn connect(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        self.gate(None, Op::Connect).await?;

        if username != self.inner.username
            || password.expose_secret() != self.inner.password.expose_secret()
        {
            return Err(Error::Authentication {
                message: format!("credentials rejected for {username}"),
            });
        }

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        tracing::debug!(username, "memory account connected");
        self.emit(PushEvent::ConnectionStateChanged { connected: true });
        Ok(())
    }

    async fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            self.emit(PushEvent::ConnectionStateChanged { connected: false });
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, Error> {
        self.gate(None, Op::ListDevices).await?;
        self.require_connected()?;

        let mut summaries: Vec<DeviceSummary> = self
            .inner
            .devices
            .iter()
            .map(|entry| DeviceSummary {
                id: entry.key().clone(),
                name: entry.name.clone(),
                model: entry.model.clone(),
                online: entry.online,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn open_session(&self, id: &DeviceId) -> Result<Arc<dyn DeviceSession>, Error> {
        self.gate(Some(id), Op::OpenSession).await?;
        self.require_connected()?;

        if !self.inner.devices.contains_key(id) {
            return Err(Error::UnknownDevice {
                device_id: id.to_string(),
            });
        }

        Ok(Arc::new(MemorySession {
            account: self.clone(),
            id: id.clone(),
            generation: self.inner.generation.load(Ordering::SeqCst),
        }))
    }

    fn push_events(&self) -> Option<broadcast::Receiver<Arc<PushEvent>>> {
        self.inner
            .push_enabled
            .load(Ordering::SeqCst)
            .then(|| self.inner.push_tx.subscribe())
    }
}

// ── MemorySession ───────────────────────────────────────────────────

#[derive(Debug)]
struct MemorySession {
    account: MemoryAccount,
    id: DeviceId,
    generation: u64,
}

impl MemorySession {
    fn ensure_live(&self) -> Result<(), Error> {
        self.account.require_connected()?;
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::SessionClosed {
                device_id: self.id.to_string(),
            })
        }
    }

    /// Run `f` against the device, failing if it is unknown or offline.
    fn with_online_device<R>(&self, f: impl FnOnce(&SimDevice) -> R) -> Result<R, Error> {
        self.ensure_live()?;
        let device = self
            .account
            .inner
            .devices
            .get(&self.id)
            .ok_or_else(|| Error::UnknownDevice {
                device_id: self.id.to_string(),
            })?;
        if !device.online {
            return Err(Error::Connectivity {
                message: format!("device {} is offline", self.id),
            });
        }
        Ok(f(device.value()))
    }

    fn missing_channel(&self, channel: u32) -> Error {
        Error::Connectivity {
            message: format!("device {} has no channel {channel}", self.id),
        }
    }
}

#[async_trait]
impl DeviceSession for MemorySession {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.generation == self.account.inner.generation.load(Ordering::SeqCst)
    }

    async fn get_channel_count(&self) -> Result<u32, Error> {
        self.account.gate(Some(&self.id), Op::ChannelCount).await?;
        self.with_online_device(SimDevice::channel_count)
    }

    async fn usb_channel_index(&self) -> Result<Option<u32>, Error> {
        self.account.gate(Some(&self.id), Op::UsbChannel).await?;
        self.with_online_device(|d| d.usb_channel)
    }

    async fn supports_telemetry(&self) -> Result<bool, Error> {
        self.account
            .gate(Some(&self.id), Op::SupportsTelemetry)
            .await?;
        self.with_online_device(|d| d.telemetry.is_some())
    }

    async fn get_channel_state(&self, channel: u32) -> Result<bool, Error> {
        self.account
            .gate(Some(&self.id), Op::GetChannel(channel))
            .await?;
        self.with_online_device(|d| d.channels.get(channel_index(channel)).copied())?
            .ok_or_else(|| self.missing_channel(channel))
    }

    async fn set_channel_state(&self, channel: u32, on: bool) -> Result<(), Error> {
        self.account
            .gate(Some(&self.id), Op::SetChannel(channel))
            .await?;
        self.with_online_device(|_| ())?;

        {
            let mut device = self
                .account
                .inner
                .devices
                .get_mut(&self.id)
                .ok_or_else(|| Error::UnknownDevice {
                    device_id: self.id.to_string(),
                })?;
            let slot = device
                .channels
                .get_mut(channel_index(channel))
                .ok_or_else(|| self.missing_channel(channel))?;
            *slot = on;
        }

        self.account.emit(PushEvent::ChannelStateChanged {
            device_id: self.id.clone(),
            channel,
            on,
        });
        Ok(())
    }

    async fn get_telemetry(&self) -> Result<Telemetry, Error> {
        self.account.gate(Some(&self.id), Op::Telemetry).await?;
        self.with_online_device(|d| d.telemetry.clone())?
            .ok_or_else(|| Error::Connectivity {
                message: format!("device {} does not report electricity", self.id),
            })
    }

    async fn is_online(&self) -> Result<bool, Error> {
        self.account.gate(Some(&self.id), Op::IsOnline).await?;
        self.ensure_live()?;
        self.account
            .inner
            .devices
            .get(&self.id)
            .map(|d| d.online)
            .ok_or_else(|| Error::UnknownDevice {
                device_id: self.id.to_string(),
            })
    }
}

fn channel_index(channel: u32) -> usize {
    usize::try_from(channel).unwrap_or(usize::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn account() -> MemoryAccount {
        MemoryAccount::new("user", "pass")
            .with_device("a", SimDevice::plug("Desk (mss310)", 1).with_telemetry(1.0, 2.0, 3.0))
            .with_device("b", SimDevice::plug("Strip (mss425)", 4).with_usb_channel(3))
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    #[tokio::test]
    async fn connect_rejects_wrong_password() {
        let acct = account();
        let err = acct.connect("user", &secret("nope")).await.unwrap_err();
        assert!(err.is_auth_failure());
        assert!(!acct.is_connected());
    }

    #[tokio::test]
    async fn list_requires_connection() {
        let acct = account();
        assert_eq!(acct.list_devices().await.unwrap_err(), Error::NotConnected);

        acct.connect("user", &secret("pass")).await.unwrap();
        let ids: Vec<_> = acct
            .list_devices()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn reconnect_invalidates_sessions() {
        let acct = account();
        acct.connect("user", &secret("pass")).await.unwrap();
        let session = acct.open_session(&DeviceId::from("a")).await.unwrap();
        assert!(session.is_active());

        acct.connect("user", &secret("pass")).await.unwrap();
        assert!(!session.is_active());
        assert!(matches!(
            session.get_channel_state(0).await,
            Err(Error::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn injected_error_is_returned_and_counted() {
        let acct = account();
        acct.connect("user", &secret("pass")).await.unwrap();
        acct.inject(
            Some("a"),
            Op::Telemetry,
            Fault::Error(Error::timeout(Duration::from_secs(1))),
        );
        let session = acct.open_session(&DeviceId::from("a")).await.unwrap();

        assert!(session.get_telemetry().await.unwrap_err().is_timeout());
        assert_eq!(acct.call_count(Some("a"), Op::Telemetry), 1);

        acct.clear_faults();
        assert_eq!(session.get_telemetry().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_completes() {
        let acct = account();
        acct.connect("user", &secret("pass")).await.unwrap();
        acct.inject(Some("a"), Op::IsOnline, Fault::Hang);
        let session = acct.open_session(&DeviceId::from("a")).await.unwrap();

        let res = tokio::time::timeout(Duration::from_secs(5), session.is_online()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn button_press_toggles_and_pushes() {
        let acct = account();
        let mut rx = acct.push_events().unwrap();

        assert_eq!(acct.press_button("b", 2), Some(true));
        assert_eq!(acct.channel_state("b", 2), Some(true));

        let evt = rx.try_recv().unwrap();
        assert_eq!(
            *evt,
            PushEvent::ChannelStateChanged {
                device_id: DeviceId::from("b"),
                channel: 2,
                on: true,
            }
        );
    }

    #[tokio::test]
    async fn offline_device_rejects_reads() {
        let acct = account();
        acct.connect("user", &secret("pass")).await.unwrap();
        let session = acct.open_session(&DeviceId::from("a")).await.unwrap();
        acct.set_online("a", false);

        assert!(!session.is_online().await.unwrap());
        assert!(matches!(
            session.get_channel_state(0).await,
            Err(Error::Connectivity { .. })
        ));
    }

    #[test]
    fn fixture_parses_devices() {
        let raw = r#"
            username = "u"
            password = "p"
            push_events = false

            [[devices]]
            id = "x1"
            name = "Heater (mss310)"
            channels = [true]
            telemetry = { power = 1500000.0, current = 6500.0, voltage = 2305.0 }

            [[devices]]
            id = "x2"
            name = "Broken (mss110)"
            reported_channels = 0
            online = false
        "#;
        let acct = MemoryAccount::from_fixture_str(raw).unwrap();
        assert!(acct.push_events().is_none());

        let heater = acct.device("x1").unwrap();
        assert_eq!(heater.channels, vec![true]);
        assert!(heater.telemetry.is_some());

        let broken = acct.device("x2").unwrap();
        assert_eq!(broken.reported_channels, Some(0));
        assert!(!broken.online);
        assert_eq!(broken.channels, vec![false]);
    }

    #[test]
    fn fixture_reports_parse_errors() {
        let err = MemoryAccount::from_fixture_str("username = 3").unwrap_err();
        assert!(matches!(err, Error::Fixture { .. }));
    }
}
