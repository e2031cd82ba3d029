// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use futures::stream::StreamExt;
use log::{trace, warn};
use std::fmt;
use std::sync::Weak;

use super::{Session, SessionInner};
use crate::api::{CharacteristicRef, NotificationStream, Transport};
use crate::encoding;
use crate::{Error, Result};

/// A decoded value pushed by the peripheral.
#[cfg_attr(
    feature = "serde",
    derive(serde_cr::Serialize, serde_cr::Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: CharacteristicRef,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub value: Vec<u8>,
}

impl Notification {
    pub fn hex(&self) -> String {
        encoding::bytes_to_hex(&self.value)
    }

    /// The value as text, one character per byte.
    pub fn text(&self) -> String {
        encoding::bytes_to_text(&self.value)
    }
}

/// Handle to an active notification subscription.
///
/// Dropping the handle leaves the subscription running; it ends on [`cancel`](Self::cancel),
/// on disconnection, or when another subscription to the same characteristic replaces it.
pub struct Subscription<T: Transport> {
    pub(super) session: Session<T>,
    pub(super) characteristic: CharacteristicRef,
    pub(super) key: u64,
}

impl<T: Transport> Subscription<T> {
    pub fn characteristic(&self) -> &CharacteristicRef {
        &self.characteristic
    }

    /// False once the subscription was cancelled, replaced or ended by a disconnect.
    pub fn is_active(&self) -> bool {
        self.session
            .lock()
            .subscriptions
            .get(&self.characteristic)
            .is_some_and(|active| active.key == self.key)
    }

    /// Stops delivery and disables notifications on the peripheral. Does nothing if the
    /// subscription already ended.
    pub async fn cancel(self) -> Result<()> {
        let (active, peripheral) = {
            let mut state = self.session.lock();
            match state.subscriptions.get(&self.characteristic) {
                Some(active) if active.key == self.key => (
                    state.subscriptions.remove(&self.characteristic),
                    state.connected_peripheral().cloned(),
                ),
                _ => return Ok(()),
            }
        };
        drop(active);
        if let Some(id) = peripheral {
            self.session
                .inner
                .transport
                .unsubscribe(&id, &self.characteristic)
                .await
                .map_err(|e| Error::transport("unsubscribe", e))?;
        }
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("characteristic", &self.characteristic)
            .field("key", &self.key)
            .finish()
    }
}

/// Decodes every notification for `characteristic` and hands it to `on_value`.
pub(super) async fn pump<T, F>(
    session: Weak<SessionInner<T>>,
    epoch: u64,
    characteristic: CharacteristicRef,
    mut notifications: NotificationStream,
    on_value: F,
) where
    T: Transport,
    F: Fn(Notification) + Send + Sync + 'static,
{
    while let Some(raw) = notifications.next().await {
        if raw.characteristic != characteristic {
            continue;
        }
        let value = match raw.value.decode() {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping undecodable notification from {}: {}", characteristic, e);
                continue;
            }
        };
        trace!("Notification from {}: {}", characteristic, encoding::bytes_to_hex(&value));
        if let Some(inner) = session.upgrade() {
            Session { inner }.record(epoch, |buffers| buffers.last_received = Some(value.clone()));
        }
        on_value(Notification {
            characteristic,
            value,
        });
    }
}
