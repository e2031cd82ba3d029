// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `platform` module names the [`Transport`] backed by this platform's Bluetooth stack,
//! where there is one.

#[cfg(target_os = "linux")]
pub use crate::bluez::BluezTransport as PlatformTransport;

use crate::api::{CharacteristicRef, PeripheralId};
use crate::encoding::EncodedValue;
use crate::registry::UuidRegistry;
use crate::session::{SessionEvent, SessionState};
use static_assertions::assert_impl_all;
use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

// Ensure that the exported types implement all the expected traits.
#[cfg(target_os = "linux")]
assert_impl_all!(PlatformTransport: crate::api::Transport, Clone, Debug, Send, Sized, Sync);
#[cfg(any(test, feature = "mock"))]
assert_impl_all!(crate::mock::MockTransport: crate::api::Transport, Clone, Debug, Send, Sized, Sync);
#[cfg(any(test, feature = "mock"))]
assert_impl_all!(crate::session::Session<crate::mock::MockTransport>: Clone, Debug, Send, Sync);
assert_impl_all!(
    PeripheralId: Clone,
    Debug,
    Display,
    Hash,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Send,
    Sized,
    Sync
);
assert_impl_all!(CharacteristicRef: Copy, Debug, Display, Hash, Ord, Send, Sync);
assert_impl_all!(EncodedValue: Clone, Debug, Display, Hash, Eq, Send, Sync);
assert_impl_all!(UuidRegistry: Clone, Debug, Default, Eq, Send, Sync);
assert_impl_all!(SessionEvent: Clone, Debug, Send, Sync);
assert_impl_all!(SessionState: Copy, Debug, Eq, Send, Sync);
