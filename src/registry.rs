// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Sorting of a peripheral's characteristics by what can be done with them.
//!
//! A [`UuidRegistry`] keeps one list per [`Capability`]. Callers address a characteristic
//! by capability and position in that list, so the lists keep discovery order and are
//! never re-sorted. A characteristic that is both readable and notifiable shows up in both
//! lists, usually at different indices.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::fmt::{self, Display, Formatter};

use crate::api::{CharPropFlags, Characteristic, CharacteristicRef, Service};

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    WriteWithResponse,
    WriteWithoutResponse,
    /// Notify or indicate.
    Notify,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Read,
        Capability::WriteWithResponse,
        Capability::WriteWithoutResponse,
        Capability::Notify,
    ];

    /// The characteristic property bits that grant this capability.
    pub fn flags(self) -> CharPropFlags {
        match self {
            Capability::Read => CharPropFlags::READ,
            Capability::WriteWithResponse => CharPropFlags::WRITE,
            Capability::WriteWithoutResponse => CharPropFlags::WRITE_WITHOUT_RESPONSE,
            Capability::Notify => CharPropFlags::NOTIFY | CharPropFlags::INDICATE,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Capability::Read => "readable",
            Capability::WriteWithResponse => "writable",
            Capability::WriteWithoutResponse => "writable-without-response",
            Capability::Notify => "notifiable",
        })
    }
}

/// Four capability lists of (service UUID, characteristic UUID) pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UuidRegistry {
    lists: [Vec<CharacteristicRef>; 4],
}

impl UuidRegistry {
    /// Walks services, then characteristics, in the order given.
    pub fn build(services: &[Service]) -> Self {
        let mut registry = UuidRegistry::default();
        for service in services {
            for capability in Capability::ALL {
                registry.lists[capability.slot()].extend(
                    service
                        .characteristics_with(capability.flags())
                        .map(Characteristic::target),
                );
            }
        }
        registry
    }

    pub fn clear(&mut self) {
        self.lists.iter_mut().for_each(Vec::clear);
    }

    pub fn get(&self, capability: Capability, index: usize) -> Option<&CharacteristicRef> {
        self.list(capability).get(index)
    }

    pub fn list(&self, capability: Capability) -> &[CharacteristicRef] {
        &self.lists[capability.slot()]
    }

    pub fn len(&self, capability: Capability) -> usize {
        self.list(capability).len()
    }

    /// True when all four lists are empty.
    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Position of a characteristic within a capability list, if it is in it.
    pub fn index_of(&self, capability: Capability, target: &CharacteristicRef) -> Option<usize> {
        self.list(capability).iter().position(|c| c == target)
    }
}
