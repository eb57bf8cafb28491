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

//! In-process transport.
//!
//! Streams are `tokio::io::duplex` pairs. The test side drives the remote
//! end: it injects inbound connections, scripts dial outcomes, and holds the
//! peer half of every stream.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::device::{DeviceIdentity, TrustMode};
use super::transport::{BoxedStream, Listener, Transport};
use crate::error::TransportError;

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// What a dial to a given address does.
#[derive(Debug, Clone)]
pub enum DialPlan {
    /// Connects; the remote half is queued for [`MemoryTransport::next_dialed`].
    Accept,
    /// Fails with the given reason.
    Fail(String),
    /// Never completes.
    Hang,
}

enum Inbound {
    Connection(DuplexStream, DeviceIdentity),
    Error(String),
}

struct Endpoint {
    id: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

struct MemoryState {
    available: bool,
    next_id: u64,
    endpoints: HashMap<TrustMode, Endpoint>,
    plans: HashMap<String, DialPlan>,
    listen_failures: usize,
    dials: usize,
}

struct Shared {
    state: Mutex<MemoryState>,
    open: watch::Sender<usize>,
    dialed_tx: mpsc::UnboundedSender<(DeviceIdentity, TrustMode, DuplexStream)>,
    dialed_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(DeviceIdentity, TrustMode, DuplexStream)>>,
}

/// In-memory [`Transport`].
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        let (dialed_tx, dialed_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MemoryState {
                    available: true,
                    next_id: 0,
                    endpoints: HashMap::new(),
                    plans: HashMap::new(),
                    listen_failures: 0,
                    dials: 0,
                }),
                open,
                dialed_tx,
                dialed_rx: tokio::sync::Mutex::new(dialed_rx),
            }),
        }
    }

    /// Simulate the adapter being switched on or off.
    pub fn set_available(&self, available: bool) {
        self.shared.state.lock().available = available;
    }

    /// Script the outcome of dials to `address`. Unscripted dials connect.
    pub fn plan_dial(&self, address: &str, plan: DialPlan) {
        self.shared
            .state
            .lock()
            .plans
            .insert(address.to_ascii_uppercase(), plan);
    }

    /// Make the next `count` calls to `listen` fail.
    pub fn fail_next_listens(&self, count: usize) {
        self.shared.state.lock().listen_failures = count;
    }

    /// Number of currently open listening endpoints.
    pub fn open_listeners(&self) -> usize {
        *self.shared.open.borrow()
    }

    pub fn is_listening(&self, mode: TrustMode) -> bool {
        self.shared.state.lock().endpoints.contains_key(&mode)
    }

    /// Number of dial attempts made so far.
    pub fn dial_count(&self) -> usize {
        self.shared.state.lock().dials
    }

    /// Wait until exactly `count` listening endpoints are open.
    pub async fn wait_for_listeners(&self, count: usize) {
        let mut rx = self.shared.open.subscribe();
        let _ = rx.wait_for(|open| *open == count).await;
    }

    /// Deliver an inbound connection from `peer` to the `mode` endpoint.
    ///
    /// Returns the peer's half of the stream, or `None` when nothing listens on `mode`.
    pub fn inject_inbound(&self, mode: TrustMode, peer: DeviceIdentity) -> Option<DuplexStream> {
        let state = self.shared.state.lock();
        let endpoint = state.endpoints.get(&mode)?;
        let (local, remote) = tokio::io::duplex(DUPLEX_CAPACITY);
        endpoint
            .tx
            .send(Inbound::Connection(local, peer))
            .ok()
            .map(|_| remote)
    }

    /// Make the pending `accept` on the `mode` endpoint fail.
    pub fn fail_accept(&self, mode: TrustMode, reason: &str) -> bool {
        let state = self.shared.state.lock();
        match state.endpoints.get(&mode) {
            Some(endpoint) => endpoint.tx.send(Inbound::Error(reason.to_string())).is_ok(),
            None => false,
        }
    }

    /// Remote half of the next successful dial.
    pub async fn next_dialed(&self) -> Option<(DeviceIdentity, TrustMode, DuplexStream)> {
        self.shared.dialed_rx.lock().await.recv().await
    }

    fn release(&self, mode: TrustMode, id: u64) {
        let mut state = self.shared.state.lock();
        if state.endpoints.get(&mode).map(|e| e.id) == Some(id) {
            state.endpoints.remove(&mode);
        }
        let open = state.endpoints.len();
        drop(state);
        self.shared.open.send_replace(open);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn is_available(&self) -> bool {
        self.shared.state.lock().available
    }

    async fn listen(&self, mode: TrustMode) -> Result<Box<dyn Listener>, TransportError> {
        let mut state = self.shared.state.lock();
        if !state.available {
            return Err(TransportError::Unavailable);
        }
        if state.listen_failures > 0 {
            state.listen_failures -= 1;
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                "service record busy",
            )));
        }
        if state.endpoints.contains_key(&mode) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} endpoint already open", mode),
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.insert(mode, Endpoint { id, tx });
        let open = state.endpoints.len();
        drop(state);
        self.shared.open.send_replace(open);
        debug!("Memory {} endpoint {} open", mode, id);

        Ok(Box::new(MemoryListener {
            mode,
            id,
            rx,
            transport: self.clone(),
            closed: false,
        }))
    }

    async fn connect(
        &self,
        peer: &DeviceIdentity,
        mode: TrustMode,
    ) -> Result<BoxedStream, TransportError> {
        let plan = {
            let mut state = self.shared.state.lock();
            if !state.available {
                return Err(TransportError::Unavailable);
            }
            state.dials += 1;
            state
                .plans
                .get(&peer.address().to_ascii_uppercase())
                .cloned()
                .unwrap_or(DialPlan::Accept)
        };

        match plan {
            DialPlan::Accept => {
                let (local, remote) = tokio::io::duplex(DUPLEX_CAPACITY);
                let _ = self.shared.dialed_tx.send((peer.clone(), mode, remote));
                Ok(Box::new(local))
            }
            DialPlan::Fail(reason) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                reason,
            ))),
            DialPlan::Hang => futures::future::pending().await,
        }
    }
}

struct MemoryListener {
    mode: TrustMode,
    id: u64,
    rx: mpsc::UnboundedReceiver<Inbound>,
    transport: MemoryTransport,
    closed: bool,
}

impl MemoryListener {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rx.close();
            self.transport.release(self.mode, self.id);
        }
    }
}

#[async_trait]
impl Listener for MemoryListener {
    fn mode(&self) -> TrustMode {
        self.mode
    }

    async fn accept(&mut self) -> Result<(BoxedStream, DeviceIdentity), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.rx.recv().await {
            Some(Inbound::Connection(stream, peer)) => Ok((Box::new(stream), peer)),
            Some(Inbound::Error(reason)) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Other,
                reason,
            ))),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.release();
    }
}
