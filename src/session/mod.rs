// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The device session: one scan or one connection at a time, and everything that has to be
//! torn down when it ends.
//!
//! ```text
//! Idle ──scan──▶ Scanning ──timeout / stop_scan──▶ Idle
//!  │                 │
//!  └────connect──────┴──▶ Connecting ──ok──▶ Connected ──disconnect / link lost──▶ Idle
//!                             ├──error──▶ Idle
//!                             └──scan / connect──▶ the newer operation takes over
//! ```
//!
//! Every scan, connect and disconnect bumps an epoch. Work started under an older epoch (a
//! scan timer, a connect that was overtaken, a late disconnect observer) finds the epoch
//! moved on and discards itself instead of overwriting newer state.
//!
//! All methods must be called from within a tokio runtime: scans, notification delivery and
//! the disconnect observer run as spawned tasks.

mod events;
mod subscription;
mod watch;

pub use events::{DisconnectCause, SessionEvent, SessionEventStream};
pub use subscription::{Notification, Subscription};

use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use self::events::EventHub;
use self::watch::{DisconnectWatch, TaskGuard};
use crate::api::{
    AdapterState, CharacteristicRef, ConnectionState, EventStream, NotificationStream, Peripheral,
    PeripheralId, PeripheralProperties, Service, Transport, TransportError, TransportEvent,
    WriteType,
};
use crate::common::discovered::DiscoveredPeripherals;
use crate::encoding::{self, EncodedValue, Payload};
use crate::registry::{Capability, UuidRegistry};
use crate::{Error, Result, SessionConfig};

#[cfg_attr(
    feature = "serde",
    derive(serde_cr::Serialize, serde_cr::Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
}

/// The last values that went through the active connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffers {
    pub last_read: Option<Vec<u8>>,
    pub last_written: Option<Vec<u8>>,
    pub last_received: Option<Vec<u8>>,
}

#[derive(Debug)]
struct ActiveSubscription {
    key: u64,
    _task: TaskGuard,
}

/// Everything torn down together when a connection ends. Dropping it aborts the tasks.
#[derive(Debug)]
struct Teardown {
    peripheral: Option<PeripheralId>,
    _watch: Option<DisconnectWatch>,
    _subscriptions: Vec<ActiveSubscription>,
}

impl Teardown {
    /// Aborts the connection's tasks and hands back the peripheral it was for.
    fn finish(self) -> Option<PeripheralId> {
        self.peripheral
    }
}

#[derive(Debug)]
struct State {
    phase: SessionState,
    epoch: u64,
    scan: Option<TaskGuard>,
    /// Target of the current connect attempt or connection.
    peripheral: Option<PeripheralId>,
    /// The peripheral of the last connection that ended.
    previous: Option<PeripheralId>,
    services: Vec<Service>,
    registry: UuidRegistry,
    buffers: Buffers,
    watch: Option<DisconnectWatch>,
    subscriptions: HashMap<CharacteristicRef, ActiveSubscription>,
    next_subscription: u64,
}

impl State {
    fn new() -> Self {
        State {
            phase: SessionState::Idle,
            epoch: 0,
            scan: None,
            peripheral: None,
            previous: None,
            services: Vec::new(),
            registry: UuidRegistry::default(),
            buffers: Buffers::default(),
            watch: None,
            subscriptions: HashMap::new(),
            next_subscription: 0,
        }
    }

    fn connected_peripheral(&self) -> Option<&PeripheralId> {
        match self.phase {
            SessionState::Connected => self.peripheral.as_ref(),
            _ => None,
        }
    }

    fn out_of_state(&self, operation: &'static str) -> Error {
        Error::OperationOutOfState {
            operation,
            state: self.phase,
        }
    }

    /// Back to Idle with an empty registry and buffers. Supersedes anything in flight.
    fn reset(&mut self) -> Teardown {
        self.epoch += 1;
        self.phase = SessionState::Idle;
        let peripheral = self.peripheral.take();
        if peripheral.is_some() {
            self.previous = peripheral.clone();
        }
        self.services.clear();
        self.registry.clear();
        self.buffers = Buffers::default();
        Teardown {
            peripheral,
            _watch: self.watch.take(),
            _subscriptions: self.subscriptions.drain().map(|(_, s)| s).collect(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SessionInner<T: Transport> {
    transport: T,
    config: SessionConfig,
    discovered: DiscoveredPeripherals,
    events: EventHub,
    state: Mutex<State>,
}

/// A central-role session with at most one peripheral. Cloning yields another handle to the
/// same session.
#[derive(Debug)]
pub struct Session<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Session {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let events = EventHub::new(config.event_capacity);
        Session {
            inner: Arc::new(SessionInner {
                transport,
                config,
                discovered: DiscoveredPeripherals::default(),
                events,
                state: Mutex::new(State::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn weak(&self) -> Weak<SessionInner<T>> {
        Arc::downgrade(&self.inner)
    }

    fn emit(&self, event: SessionEvent) {
        self.inner.events.emit(event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.lock().phase
    }

    /// Stream of everything that happens to this session from now on.
    pub fn events(&self) -> SessionEventStream {
        self.inner.events.stream()
    }

    pub async fn adapter_state(&self) -> Result<AdapterState> {
        self.inner
            .transport
            .adapter_state()
            .await
            .map_err(|e| Error::transport("query adapter state", e))
    }

    async fn ensure_powered(&self, operation: &'static str) -> Result<()> {
        match self.adapter_state().await? {
            AdapterState::PoweredOff => {
                Err(Error::TransportUnavailable(TransportError::PoweredOff))
            }
            AdapterState::Unsupported => {
                Err(Error::TransportUnavailable(TransportError::Unsupported))
            }
            state => {
                debug!("Adapter {:?} before {}", state, operation);
                Ok(())
            }
        }
    }

    /// Peripherals reported by the latest scan, in discovery order.
    pub fn peripherals(&self) -> Vec<Peripheral> {
        let (phase, current, previous) = {
            let state = self.lock();
            (state.phase, state.peripheral.clone(), state.previous.clone())
        };
        self.inner
            .discovered
            .peripherals()
            .into_iter()
            .map(|properties| {
                let state = if current.as_ref() == Some(&properties.id) {
                    match phase {
                        SessionState::Connected => ConnectionState::Connected,
                        _ => ConnectionState::Connecting,
                    }
                } else if previous.as_ref() == Some(&properties.id) {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Discovered
                };
                Peripheral { properties, state }
            })
            .collect()
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<PeripheralProperties> {
        self.inner.discovered.peripheral(id)
    }

    pub fn connected_peripheral(&self) -> Option<PeripheralId> {
        self.lock().connected_peripheral().cloned()
    }

    /// Service tree of the active connection; empty when not connected.
    pub fn services(&self) -> Vec<Service> {
        self.lock().services.clone()
    }

    pub fn registry(&self) -> UuidRegistry {
        self.lock().registry.clone()
    }

    pub fn buffers(&self) -> Buffers {
        self.lock().buffers.clone()
    }

    fn record(&self, epoch: u64, update: impl FnOnce(&mut Buffers)) {
        let mut state = self.lock();
        if state.epoch == epoch {
            update(&mut state.buffers);
        }
    }

    /// Scans for the configured scan timeout.
    pub async fn scan(&self) -> Result<()> {
        self.scan_for(self.inner.config.scan_timeout).await
    }

    /// Starts a scan that stops by itself after `timeout`. A scan already running is stopped
    /// first, and a connect attempt in flight is superseded. Refused while connected. Each
    /// peripheral is announced once, as [`SessionEvent::PeripheralDiscovered`].
    pub async fn scan_for(&self, timeout: Duration) -> Result<()> {
        {
            let state = self.lock();
            if state.phase == SessionState::Connected {
                return Err(state.out_of_state("scan"));
            }
        }
        self.halt_scan().await;
        self.ensure_powered("scan").await?;
        let events = self
            .inner
            .transport
            .events()
            .await
            .map_err(|e| Error::transport("scan", e))?;

        let (epoch, superseded) = {
            let mut state = self.lock();
            match state.phase {
                SessionState::Connected => return Err(state.out_of_state("scan")),
                SessionState::Connecting => {
                    debug!("Scan supersedes connect to {:?}", state.peripheral);
                    let _ = state.reset();
                }
                _ => {}
            }
            state.epoch += 1;
            state.phase = SessionState::Scanning;
            (state.epoch, state.scan.take())
        };
        // Another scan slipped in while this one was getting ready.
        drop(superseded);
        self.inner.discovered.clear();
        self.emit(SessionEvent::StateChanged(SessionState::Scanning));

        if let Err(e) = self
            .inner
            .transport
            .start_scan(&self.inner.config.scan_filter)
            .await
        {
            let reverted = {
                let mut state = self.lock();
                let current = state.epoch == epoch && state.phase == SessionState::Scanning;
                if current {
                    state.phase = SessionState::Idle;
                }
                current
            };
            if reverted {
                self.emit(SessionEvent::StateChanged(SessionState::Idle));
            }
            return Err(Error::transport("scan", e));
        }
        info!("Scanning for {:?}", timeout);

        let handle = tokio::spawn(scan_pump(self.weak(), epoch, events, timeout));
        let mut state = self.lock();
        if state.epoch == epoch && state.phase == SessionState::Scanning {
            state.scan = Some(TaskGuard::new(handle));
        } else {
            handle.abort();
        }
        Ok(())
    }

    /// Stops a running scan early. Does nothing when not scanning.
    pub async fn stop_scan(&self) -> Result<()> {
        let Some(pump) = self.take_scan() else {
            return Ok(());
        };
        drop(pump);
        let stopped = self.inner.transport.stop_scan().await;
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        self.emit(SessionEvent::ScanStopped { timed_out: false });
        stopped.map_err(|e| Error::transport("stop scan", e))
    }

    /// `stop_scan` on the way to something else: failures are only logged.
    async fn halt_scan(&self) {
        if let Err(e) = self.stop_scan().await {
            warn!("Failed to stop the previous scan: {}", e);
        }
    }

    fn take_scan(&self) -> Option<Option<TaskGuard>> {
        let mut state = self.lock();
        if state.phase != SessionState::Scanning {
            return None;
        }
        state.phase = SessionState::Idle;
        Some(state.scan.take())
    }

    fn on_sighting(&self, epoch: u64, properties: PeripheralProperties) {
        {
            let state = self.lock();
            if state.epoch != epoch || state.phase != SessionState::Scanning {
                return;
            }
        }
        if !self.inner.config.scan_filter.accepts(&properties) {
            return;
        }
        if self.inner.discovered.insert_if_new(properties.clone()) {
            debug!("Discovered {} {:?}", properties.id, properties.local_name);
            self.emit(SessionEvent::PeripheralDiscovered(properties));
        }
    }

    /// Ends the scan started under `epoch`, if it is still the running one.
    async fn finish_scan(&self, epoch: u64, timed_out: bool) {
        let stopped = {
            let mut state = self.lock();
            let current = state.epoch == epoch && state.phase == SessionState::Scanning;
            if current {
                state.phase = SessionState::Idle;
                // Called from the scan task itself; it must not abort its own join handle.
                if let Some(pump) = state.scan.take() {
                    pump.detach();
                }
            }
            current
        };
        if !stopped {
            return;
        }
        info!("Scan finished (timed out: {})", timed_out);
        if let Err(e) = self.inner.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        self.emit(SessionEvent::ScanStopped { timed_out });
    }

    /// Connects to a peripheral, discovers its services and builds the registry. Stops a
    /// running scan first. A connect attempt still in flight is superseded: it returns
    /// [`Error::Superseded`] and leaves the session to this one.
    pub async fn connect(&self, id: &PeripheralId) -> Result<()> {
        {
            let state = self.lock();
            if state.phase == SessionState::Connected {
                return Err(state.out_of_state("connect"));
            }
        }
        self.halt_scan().await;
        self.ensure_powered("connect").await?;

        let (epoch, stray_scan) = {
            let mut state = self.lock();
            let stray_scan = match state.phase {
                SessionState::Connected => return Err(state.out_of_state("connect")),
                // Started while this connect was waiting on the adapter.
                SessionState::Scanning => Some(state.scan.take()),
                SessionState::Connecting => {
                    debug!("Superseding connect to {:?}", state.peripheral);
                    None
                }
                SessionState::Idle => None,
            };
            let _ = state.reset();
            state.phase = SessionState::Connecting;
            state.peripheral = Some(id.clone());
            (state.epoch, stray_scan)
        };
        if let Some(pump) = stray_scan {
            drop(pump);
            if let Err(e) = self.inner.transport.stop_scan().await {
                warn!("Failed to stop the previous scan: {}", e);
            }
            self.emit(SessionEvent::ScanStopped { timed_out: false });
        }
        self.emit(SessionEvent::StateChanged(SessionState::Connecting));
        info!("Connecting to {}", id);

        match self.establish(id, epoch).await {
            Ok(()) => {
                info!("Connected to {}", id);
                Ok(())
            }
            Err(_) if !self.is_current(epoch) => {
                debug!("Connect to {} superseded", id);
                Err(Error::Superseded)
            }
            Err(e) => {
                warn!("Connecting to {} failed: {}", id, e);
                self.abandon(epoch);
                Err(e)
            }
        }
    }

    async fn establish(&self, id: &PeripheralId, epoch: u64) -> Result<()> {
        let transport = &self.inner.transport;
        let connect_failed = |source: TransportError| {
            if source.is_unavailable() {
                Error::TransportUnavailable(source)
            } else {
                Error::ConnectionFailed {
                    id: id.clone(),
                    source,
                }
            }
        };

        let events = transport.events().await.map_err(connect_failed)?;
        let connect_timeout = self.inner.config.connect_timeout;
        match tokio::time::timeout(connect_timeout, transport.connect(id)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(connect_failed(source)),
            Err(_) => {
                self.drop_link(id, epoch).await;
                return Err(connect_failed(TransportError::TimedOut(connect_timeout)));
            }
        }
        if !self.is_current(epoch) {
            self.drop_link(id, epoch).await;
            return Err(Error::Superseded);
        }

        let services = match transport.discover_services(id).await {
            Ok(services) => services,
            Err(source) => {
                self.drop_link(id, epoch).await;
                return Err(if source.is_unavailable() {
                    Error::TransportUnavailable(source)
                } else {
                    Error::DiscoveryFailed {
                        id: id.clone(),
                        source,
                    }
                });
            }
        };
        let registry = UuidRegistry::build(&services);
        debug!(
            "{}: {} services, {} readable, {} writable, {} writable without response, {} notifiable",
            id,
            services.len(),
            registry.len(Capability::Read),
            registry.len(Capability::WriteWithResponse),
            registry.len(Capability::WriteWithoutResponse),
            registry.len(Capability::Notify),
        );

        let watch = DisconnectWatch::arm(self.weak(), id.clone(), epoch, events);
        let installed = {
            let mut state = self.lock();
            if state.epoch == epoch {
                state.phase = SessionState::Connected;
                state.services = services;
                state.registry = registry;
                state.watch = Some(watch);
                true
            } else {
                drop(watch);
                false
            }
        };
        if !installed {
            self.drop_link(id, epoch).await;
            return Err(Error::Superseded);
        }
        self.emit(SessionEvent::StateChanged(SessionState::Connected));
        self.emit(SessionEvent::Connected(id.clone()));
        Ok(())
    }

    /// Undoes a failed connect attempt, unless something newer already took over.
    fn abandon(&self, epoch: u64) {
        let teardown = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return;
            }
            state.reset()
        };
        drop(teardown);
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
    }

    /// Best-effort link teardown for a connection nobody will use. Left alone when a newer
    /// connect attempt has claimed the same peripheral.
    async fn drop_link(&self, id: &PeripheralId, epoch: u64) {
        let claimed = {
            let state = self.lock();
            state.epoch != epoch && state.peripheral.as_ref() == Some(id)
        };
        if claimed {
            debug!("Keeping link to {}: a newer connect owns it", id);
            return;
        }
        if let Err(e) = self.inner.transport.disconnect(id).await {
            debug!("Dropping unused link to {} failed: {}", id, e);
        }
    }

    /// Ends the connection (or connect attempt): clears the registry, the buffers, every
    /// subscription and the disconnect observer, then asks the transport to drop the link.
    /// Calling it again, or while idle, does nothing.
    pub async fn disconnect(&self) -> Result<()> {
        let (was, teardown) = {
            let mut state = self.lock();
            let was = state.phase;
            if !matches!(was, SessionState::Connecting | SessionState::Connected) {
                return Ok(());
            }
            (was, state.reset())
        };
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        let Some(id) = teardown.finish() else {
            return Ok(());
        };
        info!("Disconnecting from {}", id);
        if was == SessionState::Connected {
            self.emit(SessionEvent::Disconnected {
                id: id.clone(),
                cause: DisconnectCause::User,
            });
        }
        self.inner
            .transport
            .disconnect(&id)
            .await
            .map_err(|e| Error::transport("disconnect", e))
    }

    /// Cleanup for a link that went down on its own. Runs on the disconnect observer's task.
    fn on_link_lost(&self, epoch: u64, cause: &TransportEvent) {
        if let TransportEvent::AdapterStateChanged(adapter) = cause {
            self.emit(SessionEvent::AdapterStateChanged(*adapter));
        }
        let teardown = {
            let mut state = self.lock();
            if state.epoch != epoch || state.phase != SessionState::Connected {
                return;
            }
            if let Some(watch) = state.watch.take() {
                watch.detach();
            }
            state.reset()
        };
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
        if let Some(id) = teardown.finish() {
            info!("Link to {} lost", id);
            self.emit(SessionEvent::Disconnected {
                id,
                cause: DisconnectCause::Peripheral,
            });
        }
    }

    /// Looks up the characteristic at `index` of a capability list, failing before any
    /// transport call when not connected or out of range.
    fn resolve(
        &self,
        operation: &'static str,
        capability: Capability,
        index: usize,
    ) -> Result<(PeripheralId, CharacteristicRef, u64)> {
        let state = self.lock();
        let Some(id) = state.connected_peripheral().cloned() else {
            return Err(state.out_of_state(operation));
        };
        let target = state
            .registry
            .get(capability, index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                capability,
                index,
                len: state.registry.len(capability),
            })?;
        Ok((id, target, state.epoch))
    }

    async fn read_encoded(&self, index: usize) -> Result<EncodedValue> {
        let (id, target, epoch) = self.resolve("read", Capability::Read, index)?;
        debug!("Reading {}", target);
        let value = self
            .inner
            .transport
            .read(&id, &target)
            .await
            .map_err(|e| Error::transport("read", e))?;
        let bytes = value.decode()?;
        self.record(epoch, |buffers| buffers.last_read = Some(bytes));
        Ok(value)
    }

    /// Reads the readable characteristic at `index` and returns its value as text.
    pub async fn read(&self, index: usize) -> Result<String> {
        let value = self.read_encoded(index).await?;
        Ok(encoding::base64_to_text(value.as_str())?)
    }

    /// Reads the readable characteristic at `index` and returns the raw value.
    pub async fn read_bytes(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.read_encoded(index).await?.decode()?)
    }

    /// Writes `payload` to the writable characteristic at `index` and waits for the
    /// peripheral's acknowledgement.
    pub async fn write(&self, index: usize, payload: Payload) -> Result<()> {
        self.write_as(
            "write",
            Capability::WriteWithResponse,
            WriteType::WithResponse,
            index,
            payload,
        )
        .await
    }

    /// Writes `payload` to the characteristic at `index` of the write-without-response list.
    /// Completes once the transport accepted it; the peripheral does not confirm.
    pub async fn write_without_response(&self, index: usize, payload: Payload) -> Result<()> {
        self.write_as(
            "write without response",
            Capability::WriteWithoutResponse,
            WriteType::WithoutResponse,
            index,
            payload,
        )
        .await
    }

    async fn write_as(
        &self,
        operation: &'static str,
        capability: Capability,
        write_type: WriteType,
        index: usize,
        payload: Payload,
    ) -> Result<()> {
        let (id, target, epoch) = self.resolve(operation, capability, index)?;
        let bytes = payload.to_bytes()?;
        let value = EncodedValue::from_bytes(&bytes);
        debug!("Writing {} to {} ({:?})", value, target, write_type);
        self.inner
            .transport
            .write(&id, &target, &value, write_type)
            .await
            .map_err(|e| Error::transport(operation, e))?;
        self.record(epoch, |buffers| buffers.last_written = Some(bytes));
        Ok(())
    }

    /// Subscribes to the notifiable characteristic at `index`. Every value it pushes is
    /// decoded and passed to `on_value` until the subscription is cancelled, replaced by
    /// another subscription to the same characteristic, or the connection ends.
    pub async fn notify<F>(&self, index: usize, on_value: F) -> Result<Subscription<T>>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let (id, target, epoch) = self.resolve("notify", Capability::Notify, index)?;
        let transport = &self.inner.transport;
        let notifications = transport
            .notifications(&id)
            .await
            .map_err(|e| Error::transport("notify", e))?;
        transport
            .subscribe(&id, &target)
            .await
            .map_err(|e| Error::transport("notify", e))?;

        let claimed = {
            let mut state = self.lock();
            if state.epoch != epoch {
                // A newer connection may own a subscription to the same characteristic.
                Err(state.connected_peripheral() == Some(&id)
                    && state.subscriptions.contains_key(&target))
            } else {
                Ok(self.install_subscription(&mut state, epoch, target, notifications, on_value))
            }
        };
        let (key, replaced) = match claimed {
            Ok(installed) => installed,
            Err(in_use) => {
                if !in_use {
                    if let Err(e) = transport.unsubscribe(&id, &target).await {
                        debug!("Undoing stale subscription to {} failed: {}", target, e);
                    }
                }
                return Err(Error::Superseded);
            }
        };
        if replaced.is_some() {
            debug!("Replaced previous subscription to {}", target);
        }
        drop(replaced);
        info!("Subscribed to {}", target);
        Ok(Subscription {
            session: self.clone(),
            characteristic: target,
            key,
        })
    }

    fn install_subscription<F>(
        &self,
        state: &mut State,
        epoch: u64,
        target: CharacteristicRef,
        notifications: NotificationStream,
        on_value: F,
    ) -> (u64, Option<ActiveSubscription>)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        state.next_subscription += 1;
        let key = state.next_subscription;
        let task = tokio::spawn(subscription::pump(
            self.weak(),
            epoch,
            target,
            notifications,
            on_value,
        ));
        let replaced = state.subscriptions.insert(
            target,
            ActiveSubscription {
                key,
                _task: TaskGuard::new(task),
            },
        );
        (key, replaced)
    }
}

/// Forwards sightings until the scan times out or is aborted.
async fn scan_pump<T: Transport>(
    session: Weak<SessionInner<T>>,
    epoch: u64,
    mut events: EventStream,
    timeout: Duration,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => {
                let Some(event) = event else {
                    // No more sightings, but the scan still ends on the timer.
                    (&mut deadline).await;
                    break;
                };
                let Some(inner) = session.upgrade() else {
                    return;
                };
                let session = Session { inner };
                match event {
                    TransportEvent::DeviceDiscovered(properties) => {
                        session.on_sighting(epoch, properties);
                    }
                    TransportEvent::AdapterStateChanged(adapter) => {
                        session.emit(SessionEvent::AdapterStateChanged(adapter));
                        if matches!(adapter, AdapterState::PoweredOff | AdapterState::Unsupported) {
                            session.finish_scan(epoch, false).await;
                            return;
                        }
                    }
                    TransportEvent::DeviceDisconnected(_) => {}
                }
            }
        }
    }
    if let Some(inner) = session.upgrade() {
        Session { inner }.finish_scan(epoch, true).await;
    }
}

#[cfg(test)]
mod tests;
