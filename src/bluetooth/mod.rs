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

//! Bluetooth transport layer.
//!
//! RFCOMM endpoints over BlueZ, plus an in-process transport with the same
//! interface.

pub mod constants;
mod device;
pub mod memory;
mod rfcomm;
mod transport;

pub use device::{DeviceIdentity, SessionRole, TrustMode};
pub use memory::{DialPlan, MemoryTransport};
pub use rfcomm::RfcommTransport;
pub use transport::{BoxedStream, LinkStream, Listener, Transport};
