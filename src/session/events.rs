// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use futures::stream::{Stream, StreamExt};
use log::trace;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::SessionState;
use crate::api::{AdapterState, PeripheralId, PeripheralProperties};

/// Who ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// [`Session::disconnect`](super::Session::disconnect) was called.
    User,
    /// The peripheral or the radio dropped the link.
    Peripheral,
}

/// Things a presentation layer redraws on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A scan saw this peripheral for the first time.
    PeripheralDiscovered(PeripheralProperties),
    ScanStopped {
        /// True when the scan ran for its full timeout.
        timed_out: bool,
    },
    Connected(PeripheralId),
    Disconnected {
        id: PeripheralId,
        cause: DisconnectCause,
    },
    AdapterStateChanged(AdapterState),
}

pub type SessionEventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

#[derive(Debug)]
pub(crate) struct EventHub {
    channel: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        EventHub { channel }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Err(lost) = self.channel.send(event) {
            trace!("Lost session event, while nothing subscribed: {:?}", lost);
        }
    }

    pub fn stream(&self) -> SessionEventStream {
        let receiver = self.channel.subscribe();
        Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }))
    }
}
