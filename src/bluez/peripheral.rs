// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use bluez_async::{
    BluetoothEvent, CharacteristicEvent, CharacteristicFlags, CharacteristicId,
    CharacteristicInfo, DeviceId, DeviceInfo, ServiceInfo,
};
use dashmap::DashMap;

use crate::api::{
    CharPropFlags, Characteristic, CharacteristicRef, PeripheralId, PeripheralProperties,
    RawNotification, Service, WriteType,
};
use crate::encoding::EncodedValue;

pub(super) fn peripheral_id(device: &DeviceId) -> PeripheralId {
    PeripheralId::new(device.to_string())
}

pub(super) fn properties(device: DeviceInfo) -> PeripheralProperties {
    PeripheralProperties {
        id: peripheral_id(&device.id),
        local_name: device.name,
        rssi: device.rssi,
        services: device.services,
    }
}

/// BlueZ object ids of every discovered characteristic, both ways.
#[derive(Debug, Default)]
pub(super) struct GattTable {
    handles: DashMap<(PeripheralId, CharacteristicRef), CharacteristicId>,
    targets: DashMap<CharacteristicId, CharacteristicRef>,
}

impl GattTable {
    pub fn forget(&self, id: &PeripheralId) {
        self.handles.retain(|(peripheral, _), characteristic| {
            let keep = peripheral != id;
            if !keep {
                self.targets.remove(characteristic);
            }
            keep
        });
    }

    pub fn insert(&self, id: &PeripheralId, service: &ServiceInfo, info: &CharacteristicInfo) {
        let target = CharacteristicRef {
            service_uuid: service.uuid,
            uuid: info.uuid,
        };
        self.handles.insert((id.clone(), target), info.id.clone());
        self.targets.insert(info.id.clone(), target);
    }

    pub fn handle(
        &self,
        id: &PeripheralId,
        characteristic: &CharacteristicRef,
    ) -> Option<CharacteristicId> {
        self.handles
            .get(&(id.clone(), *characteristic))
            .map(|val| val.value().clone())
    }

    /// Turns a value change on one of `device`'s characteristics into a notification.
    pub fn notification(&self, event: BluetoothEvent, device: &DeviceId) -> Option<RawNotification> {
        match event {
            BluetoothEvent::Characteristic {
                id,
                event: CharacteristicEvent::Value { value },
            } if id.service().device() == *device => {
                let characteristic = *self.targets.get(&id)?.value();
                Some(RawNotification {
                    characteristic,
                    value: EncodedValue::from_bytes(&value),
                })
            }
            _ => None,
        }
    }
}

pub(super) fn make_service(service: &ServiceInfo, characteristics: &[CharacteristicInfo]) -> Service {
    Service {
        uuid: service.uuid,
        primary: service.primary,
        characteristics: characteristics
            .iter()
            .map(|info| Characteristic {
                uuid: info.uuid,
                service_uuid: service.uuid,
                properties: info.flags.into(),
            })
            .collect(),
    }
}

impl From<WriteType> for bluez_async::WriteType {
    fn from(write_type: WriteType) -> Self {
        match write_type {
            WriteType::WithoutResponse => bluez_async::WriteType::WithoutResponse,
            WriteType::WithResponse => bluez_async::WriteType::WithResponse,
        }
    }
}

impl From<CharacteristicFlags> for CharPropFlags {
    fn from(flags: CharacteristicFlags) -> Self {
        let mut result = CharPropFlags::default();
        if flags.contains(CharacteristicFlags::BROADCAST) {
            result.insert(CharPropFlags::BROADCAST);
        }
        if flags.contains(CharacteristicFlags::READ) {
            result.insert(CharPropFlags::READ);
        }
        if flags.contains(CharacteristicFlags::WRITE_WITHOUT_RESPONSE) {
            result.insert(CharPropFlags::WRITE_WITHOUT_RESPONSE);
        }
        if flags.contains(CharacteristicFlags::WRITE) {
            result.insert(CharPropFlags::WRITE);
        }
        if flags.contains(CharacteristicFlags::NOTIFY) {
            result.insert(CharPropFlags::NOTIFY);
        }
        if flags.contains(CharacteristicFlags::INDICATE) {
            result.insert(CharPropFlags::INDICATE);
        }
        if flags.contains(CharacteristicFlags::SIGNED_WRITE) {
            result.insert(CharPropFlags::AUTHENTICATED_SIGNED_WRITES);
        }
        if flags.contains(CharacteristicFlags::EXTENDED_PROPERTIES) {
            result.insert(CharPropFlags::EXTENDED_PROPERTIES);
        }
        result
    }
}
