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

//! Session error taxonomy.

use std::time::Duration;
use thiserror::Error;

use crate::permission::Capability;

/// Errors reported by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No Bluetooth adapter present.
    #[error("Bluetooth is not available on this device")]
    RadioUnavailable,

    /// Adapter present but powered off.
    #[error("Bluetooth is not enabled")]
    RadioDisabled,

    /// Capability not granted.
    #[error("Bluetooth {0} permission not granted")]
    PermissionDenied(Capability),

    /// Malformed address or missing payload.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure while opening the link.
    #[error("Failed to connect: {0}")]
    Connection(String),

    /// I/O failure while writing to the link.
    #[error("Failed to send data: {0}")]
    Send(String),

    /// Operation requires an established connection.
    #[error("Not connected to any device")]
    NotConnected,

    /// Blocking link I/O exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The session worker is gone.
    #[error("Session has been shut down")]
    Closed,
}

/// Coarse error category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RadioUnavailable,
    RadioDisabled,
    PermissionDenied,
    InvalidArgument,
    ConnectionError,
    SendError,
    NotConnected,
    Timeout,
    Closed,
}

impl ErrorKind {
    /// Wire code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RadioUnavailable => "BLUETOOTH_UNAVAILABLE",
            Self::RadioDisabled => "BLUETOOTH_DISABLED",
            Self::PermissionDenied => "NO_PERMISSION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::SendError => "SEND_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Timeout => "TIMEOUT",
            Self::Closed => "SESSION_CLOSED",
        }
    }

    /// Whether repeating the operation may succeed without fixing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RadioDisabled
                | Self::PermissionDenied
                | Self::ConnectionError
                | Self::SendError
                | Self::Timeout
        )
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RadioUnavailable => ErrorKind::RadioUnavailable,
            Self::RadioDisabled => ErrorKind::RadioDisabled,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Connection(_) => ErrorKind::ConnectionError,
            Self::Send(_) => ErrorKind::SendError,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
