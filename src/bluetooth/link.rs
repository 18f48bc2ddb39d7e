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

//! Serial link abstraction over the host socket primitive.

use async_trait::async_trait;
use std::io;
use uuid::Uuid;

use super::Address;

/// Opens serial links to remote devices.
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Open a stream socket to `address` for the given service class.
    ///
    /// May block for as long as the host stack takes to page the device.
    async fn open(&self, address: Address, service: Uuid) -> io::Result<Box<dyn Link>>;
}

/// An open serial link.
#[async_trait]
pub trait Link: Send {
    /// Write the whole buffer.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Close the write stream, then the socket. Errors are swallowed and
    /// the link is dropped right after.
    async fn close(&mut self);
}
