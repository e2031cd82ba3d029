// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! ble-session keeps the bookkeeping of a single central-role Bluetooth LE session.
//!
//! A [`Session`](session::Session) drives a platform stack through the
//! [`Transport`](api::Transport) trait: it scans for peripherals, connects to one, discovers
//! its GATT table and sorts every characteristic into a [`UuidRegistry`](registry::UuidRegistry)
//! by capability. Reads, writes and notifications are then addressed by capability and index,
//! the way a device browser presents them.
//!
//! Characteristic values cross the transport boundary base64-encoded; the
//! [`encoding`] module converts between that form, hex strings, raw bytes and text.
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use ble_session::bluez::BluezTransport;
//! use ble_session::encoding::Payload;
//! use ble_session::session::Session;
//! use ble_session::SessionConfig;
//!
//! let transport = BluezTransport::new().await?;
//! let session = Session::new(transport, SessionConfig::default());
//!
//! session.scan().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//! let peripheral = session.peripherals().into_iter().next().ok_or("nothing found")?;
//!
//! session.connect(&peripheral.id).await?;
//! println!("read: {}", session.read(0).await?);
//! session.write(0, Payload::text("hello")).await?;
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
#[cfg(target_os = "linux")]
pub mod bluez;
mod common;
pub mod config;
pub mod encoding;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod platform;
pub mod registry;
pub mod session;

pub use config::{ScanFilter, SessionConfig};

use crate::api::{PeripheralId, TransportError};
use crate::encoding::EncodingError;
use crate::registry::Capability;
use crate::session::SessionState;
use std::result;

/// The main error type returned by session operations.
///
/// Transport failures never escape raw: the session wraps them in the variant naming the
/// step that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bluetooth transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),

    #[error("Connecting to {id} failed: {source}")]
    ConnectionFailed {
        id: PeripheralId,
        #[source]
        source: TransportError,
    },

    #[error("Service discovery on {id} failed: {source}")]
    DiscoveryFailed {
        id: PeripheralId,
        #[source]
        source: TransportError,
    },

    #[error("Cannot {operation} while {state:?}")]
    OperationOutOfState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("No {capability} characteristic at index {index} (have {len})")]
    IndexOutOfRange {
        capability: Capability,
        index: usize,
        len: usize,
    },

    #[error("{operation} failed: {source}")]
    TransportOperationFailed {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Superseded by a newer scan, connect or disconnect")]
    Superseded,

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl Error {
    /// Wraps a transport failure that happened while performing `operation`.
    ///
    /// A powered-off or missing radio is always reported as [`Error::TransportUnavailable`],
    /// whatever the operation was.
    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        if source.is_unavailable() {
            Error::TransportUnavailable(source)
        } else {
            Error::TransportOperationFailed { operation, source }
        }
    }
}

/// Convenience type for a result using the ble-session [`Error`] type.
pub type Result<T> = result::Result<T, Error>;
