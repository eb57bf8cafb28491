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

//! Outbound dial.

use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::worker::{drain, StopSignal};
use super::Shared;
use crate::bluetooth::{DeviceIdentity, Transport, TrustMode};

/// Dials one peer, once. Timeouts are whatever the transport enforces.
pub(crate) struct ConnectorWorker<T: Transport> {
    pub(crate) generation: u64,
    pub(crate) transport: Arc<T>,
    pub(crate) service: Weak<Shared<T>>,
    pub(crate) peer: DeviceIdentity,
    pub(crate) mode: TrustMode,
    pub(crate) stop: StopSignal,
}

impl<T: Transport> ConnectorWorker<T> {
    pub(crate) async fn run(mut self, previous: Option<JoinHandle<()>>) {
        // The listener must be fully closed before dialing, or an inbound
        // accept could race this dial.
        drain(previous).await;

        info!("Dialing {} ({})", self.peer, self.mode);
        let result = tokio::select! {
            biased;
            _ = self.stop.stopped() => None,
            result = self.transport.connect(&self.peer, self.mode) => Some(result),
        };

        let result = match result {
            Some(result) if !self.stop.is_stopped() => result,
            _ => {
                debug!("Connector #{} stopped", self.generation);
                return;
            }
        };

        if let Some(service) = self.service.upgrade() {
            service.on_dial_finished(self.generation, self.mode, result);
        }
    }
}
