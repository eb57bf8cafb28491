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

//! Connection service.
//!
//! Owns at most one worker at a time: a listener, a connector, or a session.
//! Workers report back through generation-checked callbacks; a report from a
//! worker that has since been replaced is discarded.

mod connector;
mod events;
mod listener;
mod session;
mod state;
mod worker;

pub use events::{Event, EventBus, HandlerGuard, Subscription};
pub use state::{ConnectionState, ConnectionStateMachine};
pub use worker::WorkerKind;

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{BoxedStream, DeviceIdentity, SessionRole, Transport, TrustMode};
use crate::config::LinkConfig;
use crate::error::{Failure, ServiceError, TransportError};
use connector::ConnectorWorker;
use listener::ListenerWorker;
use session::{SessionWorker, SessionWriter};
use worker::{drain, stop_pair, WorkerHandle};

/// The worker currently owned by the service.
enum Active {
    Listening(WorkerHandle),
    Connecting {
        worker: WorkerHandle,
        peer: DeviceIdentity,
    },
    Connected {
        worker: WorkerHandle,
        peer: DeviceIdentity,
        role: SessionRole,
        writer: Arc<SessionWriter>,
    },
}

impl Active {
    fn worker(&self) -> &WorkerHandle {
        match self {
            Active::Listening(worker) => worker,
            Active::Connecting { worker, .. } => worker,
            Active::Connected { worker, .. } => worker,
        }
    }

    fn into_worker(self) -> WorkerHandle {
        match self {
            Active::Listening(worker) => worker,
            Active::Connecting { worker, .. } => worker,
            Active::Connected { worker, .. } => worker,
        }
    }
}

#[derive(Default)]
struct Inner {
    next_generation: u64,
    active: Option<Active>,
    /// Join handle of a retired worker nobody has waited for yet.
    draining: Option<JoinHandle<()>>,
    listen_retries: u32,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.active.as_ref().map(|a| a.worker().generation) == Some(generation)
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Stop the active worker and return the join handle the next worker
    /// must wait on.
    fn retire(&mut self) -> Option<JoinHandle<()>> {
        match self.active.take() {
            Some(active) => {
                let worker = active.into_worker();
                debug!("Retiring {} worker #{}", worker.kind, worker.generation);
                Some(worker.retire())
            }
            None => self.draining.take(),
        }
    }
}

pub(crate) struct Shared<T: Transport> {
    transport: Arc<T>,
    config: LinkConfig,
    events: EventBus,
    machine: ConnectionStateMachine,
    inner: Mutex<Inner>,
}

impl<T: Transport> Shared<T> {
    fn listen_modes(&self) -> Vec<TrustMode> {
        let mut modes = Vec::with_capacity(2);
        if self.config.listen_secure {
            modes.push(TrustMode::Secure);
        }
        if self.config.listen_insecure {
            modes.push(TrustMode::Insecure);
        }
        modes
    }

    fn spawn_listener(self: &Arc<Self>, inner: &mut Inner, delay: Option<Duration>) {
        let previous = inner.retire();
        let generation = inner.generation();
        let (stop, signal) = stop_pair();

        let worker = ListenerWorker {
            generation,
            transport: self.transport.clone(),
            service: Arc::downgrade(self),
            modes: self.listen_modes(),
            delay,
            stop: signal,
        };
        let join = tokio::spawn(worker.run(previous));
        inner.active = Some(Active::Listening(WorkerHandle::new(
            WorkerKind::Listener,
            generation,
            stop,
            join,
        )));
    }

    fn spawn_connector(self: &Arc<Self>, inner: &mut Inner, peer: DeviceIdentity, mode: TrustMode) {
        let previous = inner.retire();
        let generation = inner.generation();
        let (stop, signal) = stop_pair();

        let worker = ConnectorWorker {
            generation,
            transport: self.transport.clone(),
            service: Arc::downgrade(self),
            peer: peer.clone(),
            mode,
            stop: signal,
        };
        let join = tokio::spawn(worker.run(previous));
        inner.active = Some(Active::Connecting {
            worker: WorkerHandle::new(WorkerKind::Connector, generation, stop, join),
            peer,
        });
    }

    fn spawn_session(
        self: &Arc<Self>,
        inner: &mut Inner,
        stream: BoxedStream,
        peer: DeviceIdentity,
        role: SessionRole,
    ) {
        let previous = inner.retire();
        let generation = inner.generation();
        let (stop, signal) = stop_pair();

        let (reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(SessionWriter::new(writer));
        let worker = SessionWorker {
            generation,
            service: Arc::downgrade(self),
            peer: peer.clone(),
            role,
            reader,
            writer: writer.clone(),
            buffer_size: self.config.read_buffer_size.max(1),
            stop: signal,
        };
        let join = tokio::spawn(worker.run(previous));
        inner.active = Some(Active::Connected {
            worker: WorkerHandle::new(WorkerKind::Session, generation, stop, join),
            peer,
            role,
            writer,
        });
    }

    /// Move to CONNECTED and hand `stream` to a new session worker.
    fn establish(
        self: &Arc<Self>,
        inner: &mut Inner,
        stream: BoxedStream,
        peer: DeviceIdentity,
        role: SessionRole,
    ) {
        if let Err(e) = self.machine.transition(ConnectionState::Connected) {
            error!("Cannot establish session with {}: {}", peer, e);
            return;
        }
        inner.listen_retries = 0;
        self.events.publish(Event::DeviceResolved { peer: peer.clone() });
        info!("Connected to {} as {:?}", peer, role);
        self.spawn_session(inner, stream, peer, role);
    }

    /// Publish on behalf of a worker, if it is still the active one.
    pub(crate) fn publish_from(&self, generation: u64, event: Event) -> bool {
        let inner = self.inner.lock();
        if !inner.is_current(generation) {
            return false;
        }
        self.events.publish(event);
        true
    }

    pub(crate) fn on_accepted(
        self: &Arc<Self>,
        generation: u64,
        stream: BoxedStream,
        peer: DeviceIdentity,
        mode: TrustMode,
    ) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            debug!("Discarding stale inbound connection from {}", peer);
            return;
        }
        self.establish(&mut inner, stream, peer, SessionRole::server(mode));
    }

    /// Every endpoint of the listener is open again; a later accept error
    /// gets a fresh retry budget.
    pub(crate) fn on_listening(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.is_current(generation) && inner.listen_retries > 0 {
            debug!("Listening re-established, retry budget reset");
            inner.listen_retries = 0;
        }
    }

    pub(crate) fn on_listen_failed(self: &Arc<Self>, generation: u64, error: TransportError) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            return;
        }

        if inner.listen_retries < self.config.listen_retry_limit {
            inner.listen_retries += 1;
            warn!("Listening failed ({}), retrying", error);
            self.events
                .publish(Event::Notice(format!("Listening failed ({}), retrying", error)));
            let delay = Duration::from_millis(self.config.listen_retry_delay_ms);
            self.spawn_listener(&mut inner, Some(delay));
        } else {
            error!("Listening failed for good: {}", error);
            self.events.publish(Event::Failed(Failure::AcceptFailed {
                reason: error.to_string(),
            }));
            inner.draining = inner.retire();
            let _ = self.machine.transition(ConnectionState::None);
        }
    }

    pub(crate) fn on_dial_finished(
        self: &Arc<Self>,
        generation: u64,
        mode: TrustMode,
        result: Result<BoxedStream, TransportError>,
    ) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            debug!("Discarding stale dial result");
            return;
        }
        let peer = match &inner.active {
            Some(Active::Connecting { peer, .. }) => peer.clone(),
            _ => return,
        };

        match result {
            Ok(stream) => {
                self.establish(&mut inner, stream, peer, SessionRole::client(mode));
            }
            Err(e) => {
                warn!("Unable to connect device {}: {}", peer, e);
                self.events.publish(Event::Failed(Failure::DialFailed {
                    peer,
                    reason: e.to_string(),
                }));
                if self.machine.transition(ConnectionState::Listening).is_ok() {
                    self.spawn_listener(&mut inner, None);
                }
            }
        }
    }

    pub(crate) fn on_session_ended(self: &Arc<Self>, generation: u64, failure: Failure) {
        let mut inner = self.inner.lock();
        if !inner.is_current(generation) {
            return;
        }

        warn!("{}", failure);
        self.events.publish(Event::Failed(failure));
        if self.machine.transition(ConnectionState::Listening).is_ok() {
            self.spawn_listener(&mut inner, None);
        }
    }
}

/// Single-session connection service.
///
/// # Example
///
/// ```no_run
/// use rfcomm_link::bluetooth::MemoryTransport;
/// use rfcomm_link::{ConnectionService, DeviceIdentity, Event};
///
/// # async fn example() -> Result<(), rfcomm_link::ServiceError> {
/// let service = ConnectionService::new(MemoryTransport::new());
/// let mut events = service.subscribe();
///
/// service.start().await?;
/// service.connect(DeviceIdentity::new("CC:DD:EE:FF:00:11"), true).await?;
///
/// while let Some(event) = events.recv().await {
///     if let Event::MessageReceived(bytes) = event {
///         service.send(bytes).await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionService<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> ConnectionService<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, LinkConfig::default())
    }

    pub fn with_config(transport: T, config: LinkConfig) -> Self {
        let events = EventBus::new();
        let machine = ConnectionStateMachine::new(events.clone());
        Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                config,
                events,
                machine,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Register for events. Delivery order matches production order.
    pub fn subscribe(&self) -> Subscription {
        self.shared.events.subscribe()
    }

    /// Register a callback for events. See [`EventBus::subscribe_with`].
    pub fn subscribe_with<F>(&self, handler: F) -> HandlerGuard
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.shared.events.subscribe_with(handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.machine.current()
    }

    /// Kind of the worker currently owned by the service.
    pub fn active_worker(&self) -> Option<WorkerKind> {
        self.shared
            .inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.worker().kind)
    }

    /// Whether a session (and its stream) is live.
    pub fn has_session(&self) -> bool {
        matches!(
            self.shared.inner.lock().active,
            Some(Active::Connected { .. })
        )
    }

    /// Peer being dialed or connected to.
    pub fn peer(&self) -> Option<DeviceIdentity> {
        match &self.shared.inner.lock().active {
            Some(Active::Connecting { peer, .. }) | Some(Active::Connected { peer, .. }) => {
                Some(peer.clone())
            }
            _ => None,
        }
    }

    pub fn session_role(&self) -> Option<SessionRole> {
        match &self.shared.inner.lock().active {
            Some(Active::Connected { role, .. }) => Some(*role),
            _ => None,
        }
    }

    /// Start listening for inbound connections.
    ///
    /// Does nothing if the service is already running.
    pub async fn start(&self) -> Result<(), ServiceError> {
        if !self.shared.transport.is_available().await {
            warn!("Cannot start: Bluetooth adapter is not available");
            return Err(ServiceError::TransportUnavailable);
        }

        let mut inner = self.shared.inner.lock();
        let state = self.shared.machine.current();
        if state != ConnectionState::None {
            debug!("start() ignored in state {}", state);
            return Ok(());
        }

        self.shared.machine.transition(ConnectionState::Listening)?;
        inner.listen_retries = 0;
        self.shared.spawn_listener(&mut inner, None);
        info!("Connection service started");
        Ok(())
    }

    /// Dial `peer`, giving up listening for the duration of the attempt.
    pub async fn connect(&self, peer: DeviceIdentity, secure: bool) -> Result<(), ServiceError> {
        if !self.shared.transport.is_available().await {
            warn!("Cannot connect: Bluetooth adapter is not available");
            return Err(ServiceError::TransportUnavailable);
        }

        let mut inner = self.shared.inner.lock();
        match &inner.active {
            Some(Active::Connected { peer: current, .. }) => {
                return Err(ServiceError::AlreadyConnected(current.to_string()));
            }
            Some(Active::Connecting { peer: target, .. }) => {
                return Err(if *target == peer {
                    ServiceError::Busy(target.to_string())
                } else {
                    ServiceError::AlreadyConnected(target.to_string())
                });
            }
            _ => {}
        }

        if self.shared.machine.current() == ConnectionState::None {
            self.shared.machine.transition(ConnectionState::Listening)?;
        }
        self.shared.machine.transition(ConnectionState::Connecting)?;

        let mode = TrustMode::from_secure(secure);
        info!("Connecting to {} ({})", peer, mode);
        self.shared.spawn_connector(&mut inner, peer, mode);
        Ok(())
    }

    /// Write `bytes` to the connected peer.
    pub async fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<(), ServiceError> {
        let (generation, writer) = {
            let inner = self.shared.inner.lock();
            match &inner.active {
                Some(Active::Connected { worker, writer, .. }) => (worker.generation, writer.clone()),
                _ => return Err(ServiceError::NotConnected),
            }
        };

        let bytes = bytes.into();
        let shared = &self.shared;
        writer
            .write(&bytes, || {
                if shared.config.echo_sent {
                    shared.publish_from(generation, Event::MessageSent(bytes.clone()));
                }
            })
            .await
            .map_err(|e| {
                warn!("Write failed: {}", e);
                ServiceError::Write(e)
            })
    }

    /// Stop whatever is running and release every endpoint.
    ///
    /// Calling it again is harmless.
    pub async fn stop(&self) {
        let previous = {
            let mut inner = self.shared.inner.lock();
            let previous = inner.retire();
            if self.shared.machine.current() != ConnectionState::None {
                let _ = self.shared.machine.transition(ConnectionState::None);
                info!("Connection service stopped");
            }
            previous
        };
        drain(previous).await;
    }
}

impl<T: Transport> Drop for ConnectionService<T> {
    fn drop(&mut self) {
        let inner = self.shared.inner.lock();
        if let Some(active) = &inner.active {
            active.worker().signal_stop();
        }
    }
}
