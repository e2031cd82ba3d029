// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `api` module contains the types shared between a [`Session`](crate::session::Session)
//! and the platform stack underneath it, plus the [`Transport`] trait such a stack implements.
//!
//! Implementations live in [`bluez`](crate::bluez) (Linux) and, for tests,
//! [`mock`](crate::mock).

pub mod bleuuid;

use async_trait::async_trait;
use bitflags::bitflags;
use futures::stream::Stream;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

use self::bleuuid::BleUuid;
use crate::encoding::EncodedValue;
use crate::ScanFilter;

/// Opaque identifier a platform stack assigns to a peripheral: a D-Bus object path on
/// BlueZ, a MAC address or a UUID elsewhere.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", transparent)
)]
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        PeripheralId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeripheralId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for PeripheralId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        PeripheralId::new(id)
    }
}

impl From<String> for PeripheralId {
    fn from(id: String) -> Self {
        PeripheralId(id)
    }
}

/// Lifecycle of a peripheral as seen by the session.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

/// What a scan learned about a peripheral.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralProperties {
    pub id: PeripheralId,
    /// The advertised name, if any.
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    /// Service UUIDs named in the advertisement.
    pub services: Vec<Uuid>,
}

impl PeripheralProperties {
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        PeripheralProperties {
            id: id.into(),
            local_name: None,
            rssi: None,
            services: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }
}

/// A peripheral from a scan, together with where it stands in the session.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peripheral {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub properties: PeripheralProperties,
    pub state: ConnectionState,
}

impl std::ops::Deref for Peripheral {
    type Target = PeripheralProperties;

    fn deref(&self) -> &PeripheralProperties {
        &self.properties
    }
}

bitflags! {
    /// A set of properties that indicate what operations are supported by a Characteristic.
    #[cfg_attr(
        feature = "serde",
        derive(Serialize, Deserialize),
        serde(crate = "serde_cr")
    )]
    #[derive(Default, Debug, PartialEq, Eq, Ord, PartialOrd, Clone, Copy, Hash)]
    pub struct CharPropFlags: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

/// A GATT characteristic. Characteristics are the main way you will interact with other BLE
/// devices.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Characteristic {
    /// The UUID for this characteristic. This uniquely identifies its behavior.
    pub uuid: Uuid,
    /// The UUID of the service this characteristic belongs to.
    pub service_uuid: Uuid,
    /// The set of properties for this characteristic, which indicate what functionality it
    /// supports.
    pub properties: CharPropFlags,
}

impl Characteristic {
    /// The (service, characteristic) pair used to address this characteristic.
    pub fn target(&self) -> CharacteristicRef {
        CharacteristicRef {
            service_uuid: self.service_uuid,
            uuid: self.uuid,
        }
    }
}

impl Display for Characteristic {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "uuid: {}, char properties: {:?}",
            self.uuid, self.properties
        )
    }
}

/// Addresses one characteristic of the connected peripheral.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicRef {
    pub service_uuid: Uuid,
    pub uuid: Uuid,
}

impl Display for CharacteristicRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.service_uuid.to_short_string(),
            self.uuid.to_short_string()
        )
    }
}

/// A GATT service. Services are groups of characteristics, which may be standard or
/// device-specific.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// The UUID for this service.
    pub uuid: Uuid,
    /// Whether this is a primary service.
    pub primary: bool,
    /// The characteristics of this service, in discovery order.
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// The characteristics of this service that support any of the flags in `properties`.
    pub fn characteristics_with(
        &self,
        properties: CharPropFlags,
    ) -> impl Iterator<Item = &Characteristic> {
        self.characteristics
            .iter()
            .filter(move |c| c.properties.intersects(properties))
    }
}

/// The type of write operation to use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WriteType {
    /// A write operation where the device is expected to respond with a confirmation or error.
    /// Also known as a request.
    WithResponse,
    /// A write-without-response, also known as a command.
    WithoutResponse,
}

/// Power state of the local Bluetooth adapter.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Unsupported,
    Unknown,
}

/// A notification pushed by a peripheral, still in transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub characteristic: CharacteristicRef,
    pub value: EncodedValue,
}

/// Events a transport reports outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A scan sighted a peripheral. Sent again on every later advertisement.
    DeviceDiscovered(PeripheralProperties),
    /// The link to a peripheral went down, for whatever reason.
    DeviceDisconnected(PeripheralId),
    AdapterStateChanged(AdapterState),
}

/// Failures reported by a transport.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bluetooth adapter is powered off")]
    PoweredOff,

    #[error("Bluetooth LE is not supported here")]
    Unsupported,

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("GATT error: {0}")]
    Gatt(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// True when the radio itself cannot be used, as opposed to a single request failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::PoweredOff | TransportError::Unsupported)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A stream of transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// A stream of raw notifications from one peripheral.
pub type NotificationStream = Pin<Box<dyn Stream<Item = RawNotification> + Send>>;

/// The central-role BLE stack a session talks to. Every request is addressed by peripheral id
/// and, for attribute access, by (service, characteristic) UUID pair.
#[async_trait]
pub trait Transport: Send + Sync + Clone + Debug + 'static {
    /// Reports whether the adapter can currently be used.
    async fn adapter_state(&self) -> Result<AdapterState>;

    /// Retrieve a stream of [`TransportEvent`]s. Events that occur before this is called are
    /// not replayed.
    async fn events(&self) -> Result<EventStream>;

    /// Starts a scan for BLE devices. Sightings are announced on `events`.
    async fn start_scan(&self, filter: &ScanFilter) -> Result<()>;

    /// Stops scanning for BLE devices.
    async fn stop_scan(&self) -> Result<()>;

    /// Creates a connection to the device. If this returns Ok the link is up.
    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    /// Terminates a connection to the device.
    async fn disconnect(&self, id: &PeripheralId) -> Result<()>;

    /// Discovers all services and characteristics of a connected device, in the order the
    /// stack enumerates them.
    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Service>>;

    /// Sends a read request and returns the encoded response.
    async fn read(&self, id: &PeripheralId, characteristic: &CharacteristicRef)
        -> Result<EncodedValue>;

    /// Writes an encoded value. For [`WriteType::WithResponse`] this resolves once the device
    /// acknowledged the write; otherwise once it was handed to the stack.
    async fn write(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
        value: &EncodedValue,
        write_type: WriteType,
    ) -> Result<()>;

    /// Enables notify or indicate (depending on support) for the characteristic.
    async fn subscribe(&self, id: &PeripheralId, characteristic: &CharacteristicRef)
        -> Result<()>;

    /// Disables notify or indicate for the characteristic.
    async fn unsubscribe(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<()>;

    /// Returns a stream of value notifications from the device. Only meaningful while
    /// connected.
    async fn notifications(&self, id: &PeripheralId) -> Result<NotificationStream>;
}
