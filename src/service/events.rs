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

//! Events published to consumers.

use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::state::ConnectionState;
use crate::bluetooth::DeviceIdentity;
use crate::error::Failure;

/// Events emitted by the connection service.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The lifecycle state changed.
    StateChanged(ConnectionState),
    /// The peer of a new session is known.
    DeviceResolved { peer: DeviceIdentity },
    /// A chunk of bytes as delivered by the transport.
    MessageReceived(Vec<u8>),
    /// Bytes written to the peer.
    MessageSent(Vec<u8>),
    /// Informational, nothing failed.
    Notice(String),
    /// Something failed and the service recovered (or stopped).
    Failed(Failure),
}

/// Fan-out of events to every subscriber.
///
/// Each subscriber gets an unbounded queue, so publishing never blocks and
/// can happen while the publisher holds the lock that orders the event.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: Event) {
        let mut sinks = self.sinks.lock();
        sinks.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.lock().push(tx);
        Subscription { rx }
    }

    /// Call `handler` for every event, in order, from a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_with<F>(&self, mut handler: F) -> HandlerGuard
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        });
        HandlerGuard { task }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut sinks = self.sinks.lock();
        sinks.retain(|tx| !tx.is_closed());
        sinks.len()
    }
}

/// Receiving end of an event subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once the service is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

/// Keeps a handler subscription alive; dropping it stops delivery.
pub struct HandlerGuard {
    task: JoinHandle<()>,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_every_subscriber_sees_same_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Event::StateChanged(ConnectionState::Listening));
        bus.publish(Event::Notice("hello".into()));

        for sub in [&mut a, &mut b] {
            assert_eq!(
                sub.try_recv(),
                Some(Event::StateChanged(ConnectionState::Listening))
            );
            assert_eq!(sub.try_recv(), Some(Event::Notice("hello".into())));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let _keep = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(sub);
        bus.publish(Event::Notice("x".into()));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.publish(Event::MessageReceived(b"abc".to_vec()));
        bus.publish(Event::MessageSent(b"def".to_vec()));

        let events: Vec<Event> = sub.take(2).collect().await;
        assert_eq!(
            events,
            vec![
                Event::MessageReceived(b"abc".to_vec()),
                Event::MessageSent(b"def".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_receives_events() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = bus.subscribe_with(move |event| {
            let _ = tx.send(event);
        });

        bus.publish(Event::Notice("one".into()));
        bus.publish(Event::Notice("two".into()));

        assert_eq!(rx.recv().await, Some(Event::Notice("one".into())));
        assert_eq!(rx.recv().await, Some(Event::Notice("two".into())));
    }
}
