// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth host-stack boundary.
//!
//! Device enumeration and the serial link are traits so the session logic
//! runs the same against BlueZ or the in-memory backend.

mod address;
mod directory;
mod link;
pub mod memory;

#[cfg(feature = "bluez")]
pub mod bluez;

use uuid::Uuid;

pub use address::Address;
pub use directory::{DeviceDescriptor, DeviceDirectory, RadioState};
pub use link::{Link, LinkDriver};

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);
