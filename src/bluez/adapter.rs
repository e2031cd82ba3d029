// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use async_trait::async_trait;
use bluez_async::{
    AdapterEvent, BluetoothError, BluetoothEvent, BluetoothSession, DeviceEvent, DeviceId,
    DiscoveryFilter, WriteOptions,
};
use dashmap::DashMap;
use futures::future::ready;
use futures::stream::{self, StreamExt};
use log::{debug, trace};
use std::sync::Arc;

use super::peripheral::{make_service, peripheral_id, properties, GattTable};
use crate::api::{
    AdapterState, CharacteristicRef, EventStream, NotificationStream, PeripheralId, Result,
    Service, Transport, TransportError, TransportEvent, WriteType,
};
use crate::encoding::EncodedValue;
use crate::ScanFilter;

/// Talks to every adapter BlueZ knows through one D-Bus session.
#[derive(Clone, Debug)]
pub struct BluezTransport {
    session: BluetoothSession,
    devices: Arc<DashMap<PeripheralId, DeviceId>>,
    gatt: Arc<GattTable>,
}

impl BluezTransport {
    pub async fn new() -> Result<Self> {
        let (_, session) = BluetoothSession::new().await?;
        Ok(Self {
            session,
            devices: Arc::new(DashMap::new()),
            gatt: Arc::new(GattTable::default()),
        })
    }

    /// The BlueZ device behind `id`, looked up again if it was never seen in an event.
    async fn device(&self, id: &PeripheralId) -> Result<DeviceId> {
        if let Some(device) = self.devices.get(id) {
            return Ok(device.value().clone());
        }
        let devices = self.session.get_devices().await?;
        let device = devices
            .into_iter()
            .map(|device| device.id)
            .find(|device| peripheral_id(device) == *id)
            .ok_or(TransportError::DeviceNotFound)?;
        self.devices.insert(id.clone(), device.clone());
        Ok(device)
    }

    async fn transport_event(&self, event: BluetoothEvent) -> Option<TransportEvent> {
        match event {
            BluetoothEvent::Device {
                id,
                event: DeviceEvent::Discovered | DeviceEvent::Rssi { .. },
            } => {
                let device = self.session.get_device_info(&id).await.ok()?;
                self.devices.insert(peripheral_id(&id), id);
                Some(TransportEvent::DeviceDiscovered(properties(device)))
            }
            BluetoothEvent::Device {
                id,
                event: DeviceEvent::Connected { connected: false },
            } => Some(TransportEvent::DeviceDisconnected(peripheral_id(&id))),
            BluetoothEvent::Adapter {
                id,
                event: AdapterEvent::Powered { powered },
            } => {
                debug!("Adapter {:?} powered: {}", id, powered);
                Some(TransportEvent::AdapterStateChanged(if powered {
                    AdapterState::PoweredOn
                } else {
                    AdapterState::PoweredOff
                }))
            }
            _ => None,
        }
    }

    fn characteristic(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<bluez_async::CharacteristicId> {
        self.gatt.handle(id, characteristic).ok_or_else(|| {
            TransportError::Gatt(format!("Characteristic {} not discovered", characteristic))
        })
    }
}

#[async_trait]
impl Transport for BluezTransport {
    async fn adapter_state(&self) -> Result<AdapterState> {
        let adapters = match self.session.get_adapters().await {
            Ok(adapters) => adapters,
            Err(BluetoothError::NoBluetoothAdapters) => return Ok(AdapterState::Unsupported),
            Err(e) => return Err(e.into()),
        };
        Ok(if adapters.is_empty() {
            AdapterState::Unsupported
        } else if adapters.iter().any(|adapter| adapter.powered) {
            AdapterState::PoweredOn
        } else {
            AdapterState::PoweredOff
        })
    }

    async fn events(&self) -> Result<EventStream> {
        // There's a race between getting this event stream and getting the current set of
        // devices. Get the stream first: a duplicate sighting is better than a missed one.
        let events = self.session.event_stream().await?;

        let devices = self.session.get_devices().await?;
        for device in &devices {
            self.devices.insert(peripheral_id(&device.id), device.id.clone());
        }
        let initial_events = stream::iter(
            devices
                .into_iter()
                .map(|device| TransportEvent::DeviceDiscovered(properties(device))),
        );

        let transport = self.clone();
        let events = events.filter_map(move |event| {
            let transport = transport.clone();
            async move { transport.transport_event(event).await }
        });
        Ok(Box::pin(initial_events.chain(events)))
    }

    async fn start_scan(&self, filter: &ScanFilter) -> Result<()> {
        let filter = DiscoveryFilter {
            service_uuids: filter.services.clone(),
            ..Default::default()
        };
        self.session.start_discovery_with_filter(&filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.session.stop_discovery().await?;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let device = self.device(id).await?;
        self.session.connect(&device).await?;
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        let device = self.device(id).await?;
        self.gatt.forget(id);
        self.session.disconnect(&device).await?;
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Service>> {
        let device = self.device(id).await?;
        self.gatt.forget(id);
        let mut discovered = Vec::new();
        for service in self.session.get_services(&device).await? {
            let characteristics = self.session.get_characteristics(&service.id).await?;
            for characteristic in &characteristics {
                self.gatt.insert(id, &service, characteristic);
            }
            discovered.push(make_service(&service, &characteristics));
        }
        trace!("{}: discovered {:?}", id, discovered);
        Ok(discovered)
    }

    async fn read(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<EncodedValue> {
        let handle = self.characteristic(id, characteristic)?;
        let value = self.session.read_characteristic_value(&handle).await?;
        Ok(EncodedValue::from_bytes(&value))
    }

    async fn write(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
        value: &EncodedValue,
        write_type: WriteType,
    ) -> Result<()> {
        let handle = self.characteristic(id, characteristic)?;
        let data = value
            .decode()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let options = WriteOptions {
            write_type: Some(write_type.into()),
            ..Default::default()
        };
        self.session
            .write_characteristic_value_with_options(&handle, data, options)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> Result<()> {
        let handle = self.characteristic(id, characteristic)?;
        self.session.start_notify(&handle).await?;
        Ok(())
    }

    async fn unsubscribe(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Result<()> {
        let handle = self.characteristic(id, characteristic)?;
        self.session.stop_notify(&handle).await?;
        Ok(())
    }

    async fn notifications(&self, id: &PeripheralId) -> Result<NotificationStream> {
        let device = self.device(id).await?;
        let events = self.session.device_event_stream(&device).await?;
        let gatt = self.gatt.clone();
        Ok(Box::pin(events.filter_map(move |event| {
            ready(gatt.notification(event, &device))
        })))
    }
}
