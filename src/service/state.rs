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

//! Connection lifecycle state.
//!
//! ```text
//!  NONE ──start──▶ LISTENING ──connect──▶ CONNECTING
//!                   │   ▲  ▲                  │  │
//!       inbound     │   │  └──── dial fail ───┘  │ dial ok
//!       accept      ▼   │ stream closed          ▼
//!                  CONNECTED ◀──────────────────-┘
//!
//!  any state ──stop──▶ NONE
//! ```

use parking_lot::Mutex;
use std::fmt;
use tracing::info;

use super::events::{Event, EventBus};
use crate::error::ServiceError;

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Doing nothing.
    #[default]
    None,
    /// Waiting for an inbound connection.
    Listening,
    /// Dialing a peer.
    Connecting,
    /// A session is live.
    Connected,
}

impl ConnectionState {
    /// Whether `to` is reachable from `self` in one step.
    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (None, Listening)
                | (Listening, Connecting)
                | (Listening, Connected)
                | (Connecting, Connected)
                | (Connecting, Listening)
                | (Connected, Listening)
                | (Listening, None)
                | (Connecting, None)
                | (Connected, None)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::None => "NONE",
            ConnectionState::Listening => "LISTENING",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the current state and publishes every change.
pub struct ConnectionStateMachine {
    state: Mutex<ConnectionState>,
    events: EventBus,
}

impl ConnectionStateMachine {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(ConnectionState::None),
            events,
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `to`, returning the previous state.
    ///
    /// `StateChanged` is published before the lock is released, so no caller
    /// can observe the new state ahead of the event.
    pub fn transition(&self, to: ConnectionState) -> Result<ConnectionState, ServiceError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(ServiceError::IllegalTransition { from, to });
        }

        *state = to;
        info!("State: {} -> {}", from, to);
        self.events.publish(Event::StateChanged(to));
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_legal_edges() {
        assert!(None.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Connecting));
        assert!(Listening.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Listening));
        assert!(Connected.can_transition_to(Listening));
        for state in [Listening, Connecting, Connected] {
            assert!(state.can_transition_to(None));
        }
    }

    #[test]
    fn test_illegal_edges() {
        assert!(!None.can_transition_to(None));
        assert!(!None.can_transition_to(Connecting));
        assert!(!None.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Listening.can_transition_to(Listening));
    }

    #[test]
    fn test_transition_publishes_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let machine = ConnectionStateMachine::new(bus);

        assert_eq!(machine.transition(Listening).unwrap(), None);
        assert_eq!(machine.transition(Connecting).unwrap(), Listening);
        assert_eq!(machine.transition(Listening).unwrap(), Connecting);
        assert_eq!(machine.current(), Listening);

        assert_eq!(sub.try_recv(), Some(Event::StateChanged(Listening)));
        assert_eq!(sub.try_recv(), Some(Event::StateChanged(Connecting)));
        assert_eq!(sub.try_recv(), Some(Event::StateChanged(Listening)));
        assert_eq!(sub.try_recv(), Option::None);
    }

    #[test]
    fn test_rejected_transition_has_no_side_effect() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let machine = ConnectionStateMachine::new(bus);

        let err = machine.transition(Connected).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::IllegalTransition {
                from: None,
                to: Connected
            }
        ));
        assert_eq!(machine.current(), None);
        assert_eq!(sub.try_recv(), Option::None);
    }
}
