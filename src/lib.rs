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

//! Bluetooth Serial Port Profile session manager.
//!
//! Lists bonded devices, holds at most one SPP connection, writes payloads
//! to it and tears it down. Connects and sends run on a per-session worker
//! task and report through a [`Completion`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use spp_session::bluetooth::memory::{MemoryDirectory, MemoryLinkDriver};
//! use spp_session::{CapabilitySet, Config, SessionManager};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let session = SessionManager::new(
//!     &config.session,
//!     Arc::new(MemoryDirectory::new(Vec::new())),
//!     Arc::new(MemoryLinkDriver::new()),
//!     Arc::new(CapabilitySet::from_config(&config.permissions)),
//! );
//!
//! session.connect("00:11:22:33:44:55").await?;
//! session.send("PING").await?;
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod bluetooth;
pub mod command;
pub mod completion;
pub mod config;
pub mod error;
pub mod logging;
pub mod permission;
pub mod session;
pub mod state;

pub use completion::Completion;
pub use config::Config;
pub use error::{ErrorKind, SessionError};
pub use permission::{Capability, CapabilitySet, PermissionGate};
pub use session::SessionManager;
pub use state::SessionState;
