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

//! Error types.
//!
//! [`ServiceError`] is returned synchronously from service calls and only
//! covers caller mistakes and missing preconditions. Failures that are part of
//! normal operation (a peer walking out of range, a rejected dial) travel as
//! [`Failure`] inside `Event::Failed` instead.

use std::io;
use thiserror::Error;

use crate::bluetooth::DeviceIdentity;
use crate::service::ConnectionState;

/// Errors returned by [`crate::ConnectionService`] calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The local adapter is missing or powered off.
    #[error("Bluetooth adapter is not available")]
    TransportUnavailable,

    /// The requested state change is not a legal edge.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The same transition is already underway.
    #[error("a connection attempt to {0} is already in progress")]
    Busy(String),

    /// A session exists, or a dial to another peer is in flight.
    #[error("already connected or connecting to {0}")]
    AlreadyConnected(String),

    /// `send` was called outside the connected state.
    #[error("not connected")]
    NotConnected,

    /// Writing to the live session failed. The session itself stays up.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Errors raised by a [`crate::bluetooth::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable")]
    Unavailable,

    /// The endpoint was closed locally.
    #[error("endpoint closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("bluetooth: {0}")]
    Bluetooth(String),
}

impl TransportError {
    /// Whether the error only reflects a local close.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

impl From<bluer::Error> for TransportError {
    fn from(e: bluer::Error) -> Self {
        TransportError::Bluetooth(e.to_string())
    }
}

/// Non-fatal failure carried by `Event::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// Outbound attempt failed; the service is back to listening.
    #[error("Unable to connect device {peer}: {reason}")]
    DialFailed {
        peer: DeviceIdentity,
        reason: String,
    },

    /// Listening endpoint errored and could not be re-established.
    #[error("Unable to listen for connections: {reason}")]
    AcceptFailed { reason: String },

    /// The stream broke with an I/O error.
    #[error("Device connection was lost ({peer}): {reason}")]
    SessionLost {
        peer: DeviceIdentity,
        reason: String,
    },

    /// The peer closed the stream cleanly.
    #[error("Device connection was lost ({peer}): peer disconnected")]
    PeerDisconnected { peer: DeviceIdentity },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_tagged() {
        assert!(TransportError::Closed.is_cancellation());
        let io = TransportError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(!io.is_cancellation());
    }

    #[test]
    fn test_failure_display() {
        let peer = DeviceIdentity::named("AA:BB", "Phone");
        let failure = Failure::PeerDisconnected { peer };
        assert_eq!(
            failure.to_string(),
            "Device connection was lost (Phone [AA:BB]): peer disconnected"
        );
    }
}
