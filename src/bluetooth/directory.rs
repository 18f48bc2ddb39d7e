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

//! Bonded device enumeration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A bonded device as reported by the host stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub address: String,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Adapter availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// No adapter present.
    Unavailable,
    /// Adapter present but powered off.
    Disabled,
    Ready,
}

impl RadioState {
    /// Map a non-ready radio to its error.
    pub fn check(self) -> Result<(), SessionError> {
        match self {
            RadioState::Unavailable => Err(SessionError::RadioUnavailable),
            RadioState::Disabled => Err(SessionError::RadioDisabled),
            RadioState::Ready => Ok(()),
        }
    }
}

/// Read-only view of the adapter and its bonded devices.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn radio_state(&self) -> RadioState;

    /// All bonded devices. Order is platform-defined.
    async fn bonded_devices(&self) -> Result<Vec<DeviceDescriptor>, SessionError>;
}
