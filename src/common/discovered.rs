// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The table of peripherals a scan has reported, keyed by identifier.

use crate::api::{PeripheralId, PeripheralProperties};
use dashmap::{mapref::entry::Entry, DashMap};
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Sighting {
    order: u64,
    properties: PeripheralProperties,
}

/// First-sighting-wins table of discovered peripherals. Later sightings of a known id are
/// ignored rather than merged.
#[derive(Debug, Default)]
pub(crate) struct DiscoveredPeripherals {
    peripherals: DashMap<PeripheralId, Sighting>,
    next_order: AtomicU64,
}

impl DiscoveredPeripherals {
    /// Records a sighting. Returns true only for an id not seen since the last `clear`.
    pub fn insert_if_new(&self, properties: PeripheralProperties) -> bool {
        match self.peripherals.entry(properties.id.clone()) {
            Entry::Occupied(_) => {
                trace!("Ignoring repeated sighting of {}", properties.id);
                false
            }
            Entry::Vacant(slot) => {
                let order = self.next_order.fetch_add(1, Ordering::Relaxed);
                slot.insert(Sighting { order, properties });
                true
            }
        }
    }

    /// Every peripheral seen, in the order they were first sighted.
    pub fn peripherals(&self) -> Vec<PeripheralProperties> {
        let mut sightings: Vec<(u64, PeripheralProperties)> = self
            .peripherals
            .iter()
            .map(|val| (val.value().order, val.value().properties.clone()))
            .collect();
        sightings.sort_by_key(|(order, _)| *order);
        sightings.into_iter().map(|(_, p)| p).collect()
    }

    pub fn peripheral(&self, id: &PeripheralId) -> Option<PeripheralProperties> {
        self.peripherals
            .get(id)
            .map(|val| val.value().properties.clone())
    }

    pub fn clear(&self) {
        self.peripherals.clear();
    }
}
