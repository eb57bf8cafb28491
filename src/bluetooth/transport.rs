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

//! Transport abstraction.
//!
//! The service only needs three blocking operations from the radio: open a
//! listening endpoint for a service record, accept on it, and dial a peer.
//! Everything else (SDP, pairing, powering the adapter) belongs to the
//! platform.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::device::{DeviceIdentity, TrustMode};
use crate::error::TransportError;

/// A connected byte stream.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn LinkStream>;

/// Connection-oriented transport endpoint factory.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Whether the local adapter is present and enabled.
    async fn is_available(&self) -> bool;

    /// Open a listening endpoint on the service record for `mode`.
    async fn listen(&self, mode: TrustMode) -> Result<Box<dyn Listener>, TransportError>;

    /// Dial `peer` on the service record for `mode`. One attempt only.
    async fn connect(
        &self,
        peer: &DeviceIdentity,
        mode: TrustMode,
    ) -> Result<BoxedStream, TransportError>;
}

/// A listening endpoint.
#[async_trait]
pub trait Listener: Send {
    fn mode(&self) -> TrustMode;

    /// Wait for the next inbound connection.
    ///
    /// Returns [`TransportError::Closed`] once the endpoint has been closed.
    async fn accept(&mut self) -> Result<(BoxedStream, DeviceIdentity), TransportError>;

    /// Release the endpoint. Safe to call more than once.
    async fn close(&mut self);
}
