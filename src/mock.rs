// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! An in-memory [`Transport`] with scripted peripherals.
//!
//! Every request is recorded as a [`Call`], including the exact encoded value of each
//! write, so tests can assert what crossed the transport boundary. Sightings, pushed
//! notifications, link drops and adapter power changes are injected by hand.

use async_trait::async_trait;
use futures::stream::StreamExt;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::api::{
    AdapterState, CharPropFlags, Characteristic, CharacteristicRef, EventStream,
    NotificationStream, PeripheralId, PeripheralProperties, RawNotification, Result, Service,
    Transport, TransportError, TransportEvent, WriteType,
};
use crate::encoding::EncodedValue;
use crate::ScanFilter;

/// A request the transport received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    DiscoverServices(PeripheralId),
    Read(PeripheralId, CharacteristicRef),
    Write(PeripheralId, CharacteristicRef, EncodedValue, WriteType),
    Subscribe(PeripheralId, CharacteristicRef),
    Unsubscribe(PeripheralId, CharacteristicRef),
}

/// Operations whose failure or latency can be scripted with [`MockTransport::fail`] and
/// [`MockTransport::set_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AdapterState,
    StartScan,
    Connect,
    DiscoverServices,
    Read,
    Write,
    Subscribe,
    Disconnect,
}

/// A scripted peripheral: its advertisement and GATT table.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    properties: PeripheralProperties,
    services: Vec<Service>,
    values: HashMap<CharacteristicRef, EncodedValue>,
}

impl MockPeripheral {
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        MockPeripheral {
            properties: PeripheralProperties::new(id),
            services: Vec::new(),
            values: HashMap::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.properties.local_name = Some(name.into());
        self
    }

    pub fn service(
        mut self,
        uuid: Uuid,
        characteristics: impl IntoIterator<Item = (Uuid, CharPropFlags)>,
    ) -> Self {
        self.properties.services.push(uuid);
        self.services.push(Service {
            uuid,
            primary: true,
            characteristics: characteristics
                .into_iter()
                .map(|(c, properties)| Characteristic {
                    uuid: c,
                    service_uuid: uuid,
                    properties,
                })
                .collect(),
        });
        self
    }

    /// Value returned by reads of the characteristic until something writes it.
    pub fn value(mut self, service_uuid: Uuid, uuid: Uuid, value: &[u8]) -> Self {
        self.values.insert(
            CharacteristicRef { service_uuid, uuid },
            EncodedValue::from_bytes(value),
        );
        self
    }

    /// Stores a value exactly as given, valid base64 or not.
    pub fn raw_value(mut self, service_uuid: Uuid, uuid: Uuid, encoded: &str) -> Self {
        self.values.insert(
            CharacteristicRef { service_uuid, uuid },
            EncodedValue::unchecked(encoded),
        );
        self
    }

    pub fn properties(&self) -> &PeripheralProperties {
        &self.properties
    }
}

#[derive(Debug)]
struct MockState {
    adapter: AdapterState,
    peripherals: HashMap<PeripheralId, MockPeripheral>,
    connected: HashSet<PeripheralId>,
    subscribed: HashSet<(PeripheralId, CharacteristicRef)>,
    scanning: bool,
    failures: HashMap<Operation, TransportError>,
    delays: HashMap<Operation, Duration>,
    calls: Vec<Call>,
}

#[derive(Debug)]
struct MockInner {
    state: Mutex<MockState>,
    events: broadcast::Sender<TransportEvent>,
    notifications: broadcast::Sender<(PeripheralId, RawNotification)>,
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        let (notifications, _) = broadcast::channel(64);
        MockTransport {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState {
                    adapter: AdapterState::PoweredOn,
                    peripherals: HashMap::new(),
                    connected: HashSet::new(),
                    subscribed: HashSet::new(),
                    scanning: false,
                    failures: HashMap::new(),
                    delays: HashMap::new(),
                    calls: Vec::new(),
                }),
                events,
                notifications,
            }),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransportEvent) {
        // Nobody listening is fine: the session subscribes only while it cares.
        let _ = self.inner.events.send(event);
    }

    /// Registers a peripheral so it can be connected to. It is not advertised until
    /// [`advertise`](Self::advertise) is called.
    pub fn add_peripheral(&self, peripheral: MockPeripheral) {
        self.state()
            .peripherals
            .insert(peripheral.properties.id.clone(), peripheral);
    }

    /// Announces a sighting of a registered peripheral, as a scan would.
    pub fn advertise(&self, id: &PeripheralId) {
        let properties = self.state().peripherals.get(id).map(|p| p.properties.clone());
        if let Some(properties) = properties {
            self.emit(TransportEvent::DeviceDiscovered(properties));
        }
    }

    /// Announces a sighting with arbitrary properties.
    pub fn advertise_properties(&self, properties: PeripheralProperties) {
        self.emit(TransportEvent::DeviceDiscovered(properties));
    }

    /// Drops the link from the peripheral's side.
    pub fn drop_link(&self, id: &PeripheralId) {
        self.state().connected.remove(id);
        self.emit(TransportEvent::DeviceDisconnected(id.clone()));
    }

    pub fn set_adapter_state(&self, adapter: AdapterState) {
        self.state().adapter = adapter;
        self.emit(TransportEvent::AdapterStateChanged(adapter));
    }

    /// Pushes a notification whether or not anyone subscribed.
    pub fn notify(&self, id: &PeripheralId, characteristic: CharacteristicRef, value: &[u8]) {
        self.notify_encoded(id, characteristic, EncodedValue::from_bytes(value));
    }

    /// Pushes a notification carrying `encoded` verbatim, even if it is not base64.
    pub fn notify_raw(&self, id: &PeripheralId, characteristic: CharacteristicRef, encoded: &str) {
        self.notify_encoded(id, characteristic, EncodedValue::unchecked(encoded));
    }

    pub fn notify_encoded(
        &self,
        id: &PeripheralId,
        characteristic: CharacteristicRef,
        value: EncodedValue,
    ) {
        let _ = self.inner.notifications.send((
            id.clone(),
            RawNotification {
                characteristic,
                value,
            },
        ));
    }

    /// Makes every following `operation` fail with `error` until [`heal`](Self::heal).
    pub fn fail(&self, operation: Operation, error: TransportError) {
        self.state().failures.insert(operation, error);
    }

    /// Clears both the scripted failure and the delay of `operation`.
    pub fn heal(&self, operation: Operation) {
        let mut state = self.state();
        state.failures.remove(&operation);
        state.delays.remove(&operation);
    }

    /// Makes every following `operation` take this long before it resolves.
    pub fn set_delay(&self, operation: Operation, delay: Duration) {
        self.state().delays.insert(operation, delay);
    }

    async fn pause(&self, operation: Operation) {
        let delay = self.state().delays.get(&operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Every value written so far, in order.
    pub fn written(&self) -> Vec<EncodedValue> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(_, _, value, _) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scanning
    }

    pub fn is_connected(&self, id: &PeripheralId) -> bool {
        self.state().connected.contains(id)
    }

    pub fn is_subscribed(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> bool {
        self.state()
            .subscribed
            .contains(&(id.clone(), *characteristic))
    }

    /// Records the call and returns the scripted failure for `operation`, if any.
    fn begin(&self, call: Call, operation: Option<Operation>) -> Result<()> {
        debug!("Mock transport call: {:?}", call);
        let mut state = self.state();
        state.calls.push(call);
        match operation.and_then(|op| state.failures.get(&op)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn ensure_connected(&self, id: &PeripheralId) -> Result<()> {
        if self.is_connected(id) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn adapter_state(&self) -> Result<AdapterState> {
        self.pause(Operation::AdapterState).await;
        Ok(self.state().adapter)
    }

    async fn events(&self) -> Result<EventStream> {
        let receiver = self.inner.events.subscribe();
        Ok(Box::pin(
            BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }),
        ))
    }

    async fn start_scan(&self, _filter: &ScanFilter) -> Result<()> {
        self.begin(Call::StartScan, Some(Operation::StartScan))?;
        self.state().scanning = true;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.begin(Call::StopScan, None)?;
        self.state().scanning = false;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.begin(Call::Connect(id.clone()), Some(Operation::Connect))?;
        if !self.state().peripherals.contains_key(id) {
            return Err(TransportError::DeviceNotFound);
        }
        self.pause(Operation::Connect).await;
        self.state().connected.insert(id.clone());
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.begin(Call::Disconnect(id.clone()), Some(Operation::Disconnect))?;
        let mut state = self.state();
        state.connected.remove(id);
        state.subscribed.retain(|(peripheral, _)| peripheral != id);
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Service>> {
        self.begin(
            Call::DiscoverServices(id.clone()),
            Some(Operation::DiscoverServices),
        )?;
        self.ensure_connected(id)?;
        Ok(self
            .state()
            .peripherals
            .get(id)
            .map(|p| p.services.clone())
            .unwrap_or_default())
    }

    async fn read(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<EncodedValue> {
        self.begin(Call::Read(id.clone(), *characteristic), Some(Operation::Read))?;
        self.ensure_connected(id)?;
        Ok(self
            .state()
            .peripherals
            .get(id)
            .and_then(|p| p.values.get(characteristic).cloned())
            .unwrap_or_default())
    }

    async fn write(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
        value: &EncodedValue,
        write_type: WriteType,
    ) -> Result<()> {
        self.begin(
            Call::Write(id.clone(), *characteristic, value.clone(), write_type),
            Some(Operation::Write),
        )?;
        self.ensure_connected(id)?;
        if let Some(peripheral) = self.state().peripherals.get_mut(id) {
            peripheral.values.insert(*characteristic, value.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> Result<()> {
        self.begin(
            Call::Subscribe(id.clone(), *characteristic),
            Some(Operation::Subscribe),
        )?;
        self.pause(Operation::Subscribe).await;
        self.ensure_connected(id)?;
        self.state().subscribed.insert((id.clone(), *characteristic));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<()> {
        self.begin(Call::Unsubscribe(id.clone(), *characteristic), None)?;
        self.state()
            .subscribed
            .remove(&(id.clone(), *characteristic));
        Ok(())
    }

    async fn notifications(&self, id: &PeripheralId) -> Result<NotificationStream> {
        let receiver = self.inner.notifications.subscribe();
        let id = id.clone();
        Ok(Box::pin(BroadcastStream::new(receiver).filter_map(
            move |x| {
                let id = id.clone();
                async move {
                    match x {
                        Ok((peripheral, notification)) if peripheral == id => Some(notification),
                        _ => None,
                    }
                }
            },
        )))
    }
}
