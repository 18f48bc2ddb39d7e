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

//! Capability checks consulted before touching the radio.

use parking_lot::RwLock;
use std::fmt;

use crate::config::PermissionConfig;

/// A named Bluetooth capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Scan,
    Connect,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Scan => "scan",
            Capability::Connect => "connect",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers whether a capability is currently granted.
pub trait PermissionGate: Send + Sync {
    fn has_capability(&self, capability: Capability) -> bool;
}

/// Capability grants that can change at runtime.
#[derive(Debug)]
pub struct CapabilitySet {
    scan: RwLock<bool>,
    connect: RwLock<bool>,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::granted()
    }
}

impl CapabilitySet {
    /// Every capability granted.
    pub fn granted() -> Self {
        Self {
            scan: RwLock::new(true),
            connect: RwLock::new(true),
        }
    }

    /// Every capability denied.
    pub fn denied() -> Self {
        Self {
            scan: RwLock::new(false),
            connect: RwLock::new(false),
        }
    }

    pub fn from_config(config: &PermissionConfig) -> Self {
        Self {
            scan: RwLock::new(config.scan),
            connect: RwLock::new(config.connect),
        }
    }

    pub fn grant(&self, capability: Capability) {
        *self.slot(capability).write() = true;
    }

    pub fn revoke(&self, capability: Capability) {
        *self.slot(capability).write() = false;
    }

    fn slot(&self, capability: Capability) -> &RwLock<bool> {
        match capability {
            Capability::Scan => &self.scan,
            Capability::Connect => &self.connect,
        }
    }
}

impl PermissionGate for CapabilitySet {
    fn has_capability(&self, capability: Capability) -> bool {
        *self.slot(capability).read()
    }
}
