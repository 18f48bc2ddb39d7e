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

//! BlueZ backend.
//!
//! Connections go through an RFCOMM client profile registered for the
//! service UUID, so BlueZ resolves the channel via SDP.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream};
use bluer::{Adapter, Session};
use futures::StreamExt;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Address, DeviceDescriptor, DeviceDirectory, Link, LinkDriver, RadioState};
use crate::error::SessionError;

/// Directory and link driver backed by the system BlueZ daemon.
pub struct BluezBackend {
    session: Session,
    adapter: Option<Adapter>,
    profile: Mutex<Option<(Uuid, ProfileHandle)>>,
}

impl BluezBackend {
    /// Connect to BlueZ and pick the default adapter, if there is one.
    pub async fn new() -> Result<Self> {
        info!("Initializing BlueZ backend...");

        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter available: {}", e);
                None
            }
        };

        Ok(Self {
            session,
            adapter,
            profile: Mutex::new(None),
        })
    }

    async fn register_profile(&self, service: Uuid) -> io::Result<ProfileHandle> {
        let profile = Profile {
            uuid: service,
            name: Some("spp-session".to_string()),
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let handle = self.session.register_profile(profile).await.map_err(to_io)?;
        info!("RFCOMM client profile registered (UUID: {})", service);
        Ok(handle)
    }
}

fn to_io(e: bluer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[async_trait]
impl DeviceDirectory for BluezBackend {
    async fn radio_state(&self) -> RadioState {
        let Some(adapter) = &self.adapter else {
            return RadioState::Unavailable;
        };
        match adapter.is_powered().await {
            Ok(true) => RadioState::Ready,
            Ok(false) => RadioState::Disabled,
            Err(e) => {
                warn!("Failed to query adapter power state: {}", e);
                RadioState::Unavailable
            }
        }
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceDescriptor>, SessionError> {
        self.radio_state().await.check()?;
        let adapter = self.adapter.as_ref().ok_or(SessionError::RadioUnavailable)?;

        let addresses = adapter.device_addresses().await.map_err(|e| {
            warn!("Failed to enumerate devices: {}", e);
            SessionError::RadioUnavailable
        })?;

        let mut devices = Vec::new();
        for addr in addresses {
            let device = match adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Skipping {}: {}", addr, e);
                    continue;
                }
            };
            match device.is_paired().await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Skipping {}: failed to read pairing state: {}", addr, e);
                    continue;
                }
            }
            let name = match device.alias().await {
                Ok(name) => name,
                Err(e) => {
                    debug!("No alias for {}: {}", addr, e);
                    addr.to_string()
                }
            };
            devices.push(DeviceDescriptor::new(name, Address::from(addr).to_string()));
        }

        debug!("Found {} bonded devices", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl LinkDriver for BluezBackend {
    async fn open(&self, address: Address, service: Uuid) -> io::Result<Box<dyn Link>> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no Bluetooth adapter"))?;

        let mut profile = self.profile.lock().await;
        if profile.as_ref().map(|(uuid, _)| *uuid) != Some(service) {
            // Dropping the old handle unregisters it.
            *profile = None;
            *profile = Some((service, self.register_profile(service).await?));
        }
        let Some((_, handle)) = profile.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "profile not registered"));
        };

        let target = bluer::Address::from(address);
        let device = adapter.device(target).map_err(to_io)?;
        info!("Connecting to {} (service {})", address, service);

        let connect = device.connect_profile(&service);
        tokio::pin!(connect);
        let mut requested = false;

        loop {
            tokio::select! {
                res = &mut connect, if !requested => {
                    res.map_err(to_io)?;
                    requested = true;
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::BrokenPipe, "profile was unregistered")
                    })?;
                    if req.device() != target {
                        debug!("Ignoring connect request from {}", req.device());
                        continue;
                    }
                    let stream = req.accept().map_err(to_io)?;
                    info!("RFCOMM link established with {}", address);
                    return Ok(Box::new(RfcommLink { address, stream }));
                }
            }
        }
    }
}

/// Open RFCOMM stream to a peer.
struct RfcommLink {
    address: Address,
    stream: Stream,
}

#[async_trait]
impl Link for RfcommLink {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Ignoring close error on {}: {}", self.address, e);
        }
    }
}
