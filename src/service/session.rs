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

//! Live session I/O.
//!
//! The stream is split: the worker task owns the read half and pumps chunks
//! out as events, while the write half sits behind its own lock so `send`
//! callers never wait on a pending read.

use std::io;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::events::Event;
use super::worker::{drain, StopSignal};
use super::Shared;
use crate::bluetooth::{BoxedStream, DeviceIdentity, SessionRole, Transport};
use crate::error::Failure;

/// Write side of a session. Writes are serialized among themselves only.
pub(crate) struct SessionWriter {
    inner: Mutex<WriteHalf<BoxedStream>>,
}

impl SessionWriter {
    pub(crate) fn new(writer: WriteHalf<BoxedStream>) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Write and flush `bytes`, then run `written` before the next writer
    /// may start, so anything it publishes follows wire order.
    pub(crate) async fn write<F>(&self, bytes: &[u8], written: F) -> io::Result<()>
    where
        F: FnOnce(),
    {
        let mut writer = self.inner.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        written();
        Ok(())
    }

    async fn shutdown(&self) {
        let mut writer = self.inner.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Stream shutdown: {}", e);
        }
    }
}

pub(crate) struct SessionWorker<T: Transport> {
    pub(crate) generation: u64,
    pub(crate) service: Weak<Shared<T>>,
    pub(crate) peer: DeviceIdentity,
    pub(crate) role: SessionRole,
    pub(crate) reader: ReadHalf<BoxedStream>,
    pub(crate) writer: Arc<SessionWriter>,
    pub(crate) buffer_size: usize,
    pub(crate) stop: StopSignal,
}

impl<T: Transport> SessionWorker<T> {
    pub(crate) async fn run(mut self, previous: Option<JoinHandle<()>>) {
        drain(previous).await;
        info!("Session with {} started ({:?})", self.peer, self.role);

        let mut buf = vec![0u8; self.buffer_size];
        let failure = loop {
            let read = tokio::select! {
                biased;
                _ = self.stop.stopped() => break None,
                read = self.reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("Connection closed by remote");
                    break Some(Failure::PeerDisconnected {
                        peer: self.peer.clone(),
                    });
                }
                Ok(n) => {
                    debug!("Received {} bytes from {}", n, self.peer);
                    let delivered = match self.service.upgrade() {
                        Some(service) => {
                            service.publish_from(self.generation, Event::MessageReceived(buf[..n].to_vec()))
                        }
                        None => false,
                    };
                    if !delivered {
                        break None;
                    }
                }
                Err(e) => {
                    if self.stop.is_stopped() {
                        break None;
                    }
                    error!("Read error: {}", e);
                    break Some(Failure::SessionLost {
                        peer: self.peer.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        self.writer.shutdown().await;
        drop(self.reader);

        match failure {
            Some(failure) => {
                if let Some(service) = self.service.upgrade() {
                    service.on_session_ended(self.generation, failure);
                }
            }
            None => debug!("Session #{} with {} stopped", self.generation, self.peer),
        }
    }
}
