// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Background tasks owned by a session: the guard that aborts them and the one-shot
//! disconnect observer.

use futures::stream::StreamExt;
use log::debug;
use std::sync::Weak;
use tokio::task::JoinHandle;

use super::{Session, SessionInner};
use crate::api::{AdapterState, EventStream, PeripheralId, Transport, TransportEvent};

/// Aborts the task when dropped.
#[derive(Debug)]
pub(crate) struct TaskGuard(Option<JoinHandle<()>>);

impl TaskGuard {
    pub fn new(handle: JoinHandle<()>) -> Self {
        TaskGuard(Some(handle))
    }

    /// Lets the task run to completion. Used when a task tears down its own guard.
    pub fn detach(mut self) {
        self.0.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Fires once when the connected peripheral's link goes down, then ends. Dropping it
/// removes the observer without firing.
#[derive(Debug)]
pub(crate) struct DisconnectWatch {
    task: TaskGuard,
}

impl DisconnectWatch {
    /// `events` must have been obtained before the connect request was issued, so a drop
    /// racing the connect is not missed.
    pub fn arm<T: Transport>(
        session: Weak<SessionInner<T>>,
        id: PeripheralId,
        epoch: u64,
        mut events: EventStream,
    ) -> Self {
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let lost = match &event {
                    TransportEvent::DeviceDisconnected(gone) => *gone == id,
                    TransportEvent::AdapterStateChanged(state) => {
                        matches!(state, AdapterState::PoweredOff | AdapterState::Unsupported)
                    }
                    TransportEvent::DeviceDiscovered(_) => false,
                };
                if !lost {
                    continue;
                }
                debug!("Link to {} lost: {:?}", id, event);
                if let Some(inner) = session.upgrade() {
                    Session { inner }.on_link_lost(epoch, &event);
                }
                return;
            }
            debug!("Transport event stream for {} ended", id);
        });
        DisconnectWatch {
            task: TaskGuard::new(handle),
        }
    }

    pub fn detach(self) {
        self.task.detach();
    }
}
