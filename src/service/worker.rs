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

//! Worker bookkeeping shared by the listener, connector and session.

use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which kind of worker is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Listener,
    Connector,
    Session,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Listener => write!(f, "listener"),
            WorkerKind::Connector => write!(f, "connector"),
            WorkerKind::Session => write!(f, "session"),
        }
    }
}

/// Create a linked stop handle and signal.
pub(crate) fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

/// Owner side. Dropping it counts as a stop.
pub(crate) struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub(crate) fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Worker side.
pub(crate) struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub(crate) fn is_stopped(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the owner asked the worker to stop.
    pub(crate) async fn stopped(&mut self) {
        // An error means the handle is gone, which is a stop as well.
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// A spawned worker owned by the orchestrator.
pub(crate) struct WorkerHandle {
    pub(crate) kind: WorkerKind,
    pub(crate) generation: u64,
    stop: StopHandle,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(kind: WorkerKind, generation: u64, stop: StopHandle, join: JoinHandle<()>) -> Self {
        Self {
            kind,
            generation,
            stop,
            join,
        }
    }

    /// Signal the worker and hand back its join handle, so the next worker
    /// can wait for its resources to be released.
    pub(crate) fn retire(self) -> JoinHandle<()> {
        self.stop.stop();
        self.join
    }

    pub(crate) fn signal_stop(&self) {
        self.stop.stop();
    }
}

/// Wait for a retired worker to finish.
pub(crate) async fn drain(previous: Option<JoinHandle<()>>) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
}
