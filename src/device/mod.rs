// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device model: hardware addresses, shutdown credentials and the preset
//! table.
//!
//! The [`DeviceTable`] is loaded once at startup and is read-only
//! afterwards. It is shared between the relay receive loop and the HTTP
//! control surface behind an `Arc`.

mod mac;
mod table;

pub use mac::{MAGIC_PACKET_LEN, MacAddress};
pub use table::{DEFAULT_SSH_PORT, DeviceEntry, DeviceTable, ShutdownTarget};
