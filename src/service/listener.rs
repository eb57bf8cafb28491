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

//! Inbound connection listener.
//!
//! Opens one endpoint per enabled trust mode and accepts on all of them at
//! once. The first accept to complete wins; every endpoint is closed before
//! the stream is handed over, so a second inbound connection can never turn
//! into a second session.

use futures::future::{select_all, FutureExt};
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::worker::{drain, StopSignal};
use super::Shared;
use crate::bluetooth::{BoxedStream, DeviceIdentity, Listener, Transport, TrustMode};
use crate::error::TransportError;

type Accepted = (BoxedStream, DeviceIdentity, TrustMode);

pub(crate) struct ListenerWorker<T: Transport> {
    pub(crate) generation: u64,
    pub(crate) transport: Arc<T>,
    pub(crate) service: Weak<Shared<T>>,
    pub(crate) modes: Vec<TrustMode>,
    pub(crate) delay: Option<Duration>,
    pub(crate) stop: StopSignal,
}

impl<T: Transport> ListenerWorker<T> {
    pub(crate) async fn run(mut self, previous: Option<JoinHandle<()>>) {
        drain(previous).await;

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = self.stop.stopped() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut listeners = match self.open().await {
            Some(Ok(listeners)) => listeners,
            Some(Err(e)) => {
                error!("Failed to open listening endpoint: {}", e);
                self.report_failure(e);
                return;
            }
            None => return,
        };

        if let Some(service) = self.service.upgrade() {
            service.on_listening(self.generation);
        }
        info!(
            "Waiting for connections on {} endpoint(s)...",
            listeners.len()
        );

        let outcome = tokio::select! {
            biased;
            _ = self.stop.stopped() => None,
            accepted = accept_first(&mut listeners) => Some(accepted),
        };

        close_all(&mut listeners).await;
        drop(listeners);

        if self.stop.is_stopped() {
            debug!("Listener #{} stopped", self.generation);
            return;
        }

        match outcome {
            Some(Ok((stream, peer, mode))) => {
                if let Some(service) = self.service.upgrade() {
                    service.on_accepted(self.generation, stream, peer, mode);
                }
            }
            Some(Err(e)) => {
                error!("Accept error: {}", e);
                self.report_failure(e);
            }
            None => {}
        }
    }

    /// Open every endpoint. `None` means the worker was stopped meanwhile.
    async fn open(&mut self) -> Option<Result<Vec<Box<dyn Listener>>, TransportError>> {
        if self.modes.is_empty() {
            return Some(Err(TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no listening mode enabled",
            ))));
        }

        let mut listeners: Vec<Box<dyn Listener>> = Vec::with_capacity(self.modes.len());
        for mode in self.modes.clone() {
            let opened = tokio::select! {
                biased;
                _ = self.stop.stopped() => None,
                opened = self.transport.listen(mode) => Some(opened),
            };

            match opened {
                Some(Ok(listener)) => listeners.push(listener),
                Some(Err(e)) => {
                    close_all(&mut listeners).await;
                    return Some(Err(e));
                }
                None => {
                    close_all(&mut listeners).await;
                    return None;
                }
            }
        }
        Some(Ok(listeners))
    }

    fn report_failure(&self, error: TransportError) {
        if let Some(service) = self.service.upgrade() {
            service.on_listen_failed(self.generation, error);
        }
    }
}

/// Accept on every listener; the first to finish wins and the rest are dropped.
///
/// On a true tie the earlier listener in the slice wins.
async fn accept_first(listeners: &mut [Box<dyn Listener>]) -> Result<Accepted, TransportError> {
    let accepts = listeners.iter_mut().map(|listener| {
        async move {
            let mode = listener.mode();
            listener
                .accept()
                .await
                .map(|(stream, peer)| (stream, peer, mode))
        }
        .boxed()
    });

    let (result, _, _) = select_all(accepts).await;
    result
}

async fn close_all(listeners: &mut [Box<dyn Listener>]) {
    for listener in listeners.iter_mut() {
        listener.close().await;
    }
}
