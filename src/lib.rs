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

//! Single-session Bluetooth RFCOMM link.
//!
//! A [`ConnectionService`] either listens for one inbound connection on the
//! secure and insecure service records, or dials one peer, and then pumps raw
//! bytes over the resulting stream. Consumers observe the lifecycle through an
//! ordered [`Event`] stream.

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod service;

pub use bluetooth::{DeviceIdentity, SessionRole, TrustMode};
pub use error::{Failure, ServiceError, TransportError};
pub use service::{ConnectionService, ConnectionState, Event, Subscription};
