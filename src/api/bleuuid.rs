// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! BLE UUID helpers: expanding 16/32-bit short forms against the Bluetooth Base UUID and
//! printing UUIDs back in their shortest form.

use std::str::FromStr;
use uuid::Uuid;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

/// Expand a 32-bit short UUID into a full 128-bit UUID.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Expand a 16-bit short UUID into a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Parse a UUID the way users type them in a characteristic browser: either the full
/// hyphenated form, or a 4/8 digit short form with an optional `0x` prefix.
pub fn parse_uuid(s: &str) -> Result<Uuid, uuid::Error> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    if digits.len() == 4 || digits.len() == 8 {
        if let Ok(short) = u32::from_str_radix(digits, 16) {
            return Ok(uuid_from_u32(short));
        }
    }
    Uuid::from_str(s.trim())
}

/// An extension trait for `Uuid` which provides BLE-specific methods.
pub trait BleUuid {
    /// The 32-bit short form, if the UUID is built on the Bluetooth Base UUID.
    fn to_ble_u32(&self) -> Option<u32>;

    /// The 16-bit short form, if there is one.
    fn to_ble_u16(&self) -> Option<u16>;

    /// Convert the UUID to a string, using short format if applicable.
    fn to_short_string(&self) -> String;
}

impl BleUuid for Uuid {
    fn to_ble_u32(&self) -> Option<u32> {
        let value = self.as_u128();
        (value & BLUETOOTH_BASE_MASK == BLUETOOTH_BASE_UUID).then_some((value >> 96) as u32)
    }

    fn to_ble_u16(&self) -> Option<u16> {
        let value = self.as_u128();
        (value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID).then_some((value >> 96) as u16)
    }

    fn to_short_string(&self) -> String {
        match (self.to_ble_u16(), self.to_ble_u32()) {
            (Some(short), _) => format!("{:#06x}", short),
            (None, Some(short)) => format!("{:#010x}", short),
            _ => self.to_string(),
        }
    }
}
