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

//! In-process backend for running without a Bluetooth adapter.
//!
//! The directory serves a fixed bonded-device list. The link driver records
//! every open, write and close, counts live sockets, and can be told to
//! refuse or stall opens and to stall or fail writes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{Address, DeviceDescriptor, DeviceDirectory, Link, LinkDriver, RadioState};
use crate::error::SessionError;

/// Bonded devices held in memory.
#[derive(Debug)]
pub struct MemoryDirectory {
    radio: Mutex<RadioState>,
    devices: Mutex<Vec<DeviceDescriptor>>,
}

impl MemoryDirectory {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            radio: Mutex::new(RadioState::Ready),
            devices: Mutex::new(devices),
        }
    }

    pub fn set_radio_state(&self, state: RadioState) {
        *self.radio.lock() = state;
    }

    pub fn add_device(&self, device: DeviceDescriptor) {
        self.devices.lock().push(device);
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn radio_state(&self) -> RadioState {
        *self.radio.lock()
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceDescriptor>, SessionError> {
        self.radio_state().await.check()?;
        Ok(self.devices.lock().clone())
    }
}

/// Something that happened to a memory link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened(Address),
    Written(Address, Vec<u8>),
    Closed(Address),
}

#[derive(Debug, Default)]
struct DriverState {
    events: Vec<LinkEvent>,
    live: usize,
    max_live: usize,
    refused: HashSet<Address>,
    stalled: bool,
    open_delay: Option<Duration>,
    fail_writes: bool,
    stall_writes: bool,
    last_service: Option<Uuid>,
}

/// Link driver that connects to nothing and remembers everything.
///
/// Clones share state, so a test can keep one handle and give another to
/// the session.
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkDriver {
    state: Arc<Mutex<DriverState>>,
}

impl MemoryLinkDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens to `address` fail with `ConnectionRefused`.
    pub fn refuse(&self, address: Address) {
        self.state.lock().refused.insert(address);
    }

    /// Opens never complete.
    pub fn stall_opens(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Opens complete after `delay`.
    pub fn delay_opens(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Writes fail with `BrokenPipe`.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Writes never complete.
    pub fn stall_writes(&self, stalled: bool) {
        self.state.lock().stall_writes = stalled;
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.state.lock().events.clone()
    }

    /// Payloads written so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::Written(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Sockets currently open.
    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    /// Highest number of sockets ever open at once.
    pub fn max_live(&self) -> usize {
        self.state.lock().max_live
    }

    pub fn last_service(&self) -> Option<Uuid> {
        self.state.lock().last_service
    }
}

#[async_trait]
impl LinkDriver for MemoryLinkDriver {
    async fn open(&self, address: Address, service: Uuid) -> io::Result<Box<dyn Link>> {
        let (stalled, delay) = {
            let mut state = self.state.lock();
            state.last_service = Some(service);
            (state.stalled, state.open_delay)
        };

        if stalled {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.refused.contains(&address) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", address),
            ));
        }
        state.events.push(LinkEvent::Opened(address));
        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(Box::new(MemoryLink {
            address,
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemoryLink {
    address: Address,
    state: Arc<Mutex<DriverState>>,
    open: bool,
}

#[async_trait]
impl Link for MemoryLink {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let stalled = self.state.lock().stall_writes;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.fail_writes || !self.open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link is down"));
        }
        state
            .events
            .push(LinkEvent::Written(self.address, data.to_vec()));
        Ok(())
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl MemoryLink {
    fn release(&mut self) {
        if std::mem::take(&mut self.open) {
            let mut state = self.state.lock();
            state.live -= 1;
            state.events.push(LinkEvent::Closed(self.address));
        }
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.release();
    }
}
