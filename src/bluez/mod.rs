// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! [`Transport`](crate::api::Transport) over BlueZ, through its D-Bus API.

mod adapter;
mod peripheral;

pub use adapter::BluezTransport;

use bluez_async::BluetoothError;

use crate::api::TransportError;

impl From<BluetoothError> for TransportError {
    fn from(error: BluetoothError) -> Self {
        match error {
            BluetoothError::NoBluetoothAdapters => TransportError::Unsupported,
            BluetoothError::DbusError(e) => match e.name() {
                Some("org.bluez.Error.NotConnected") => TransportError::NotConnected,
                Some("org.bluez.Error.NotReady") => TransportError::PoweredOff,
                Some("org.bluez.Error.DoesNotExist") => TransportError::DeviceNotFound,
                Some(name) if name.starts_with("org.bluez.Error.") => {
                    TransportError::Gatt(e.to_string())
                }
                _ => TransportError::Other(e.to_string()),
            },
            error => TransportError::Other(error.to_string()),
        }
    }
}
