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

//! Peer identity and trust modes.

use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use super::constants::{INSECURE_NAME, INSECURE_UUID, SECURE_NAME, SECURE_UUID};

/// A remote Bluetooth device.
///
/// Two identities are equal when their addresses match; the display name is
/// informational only.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    address: String,
    name: Option<String>,
}

impl DeviceIdentity {
    /// Identity with an address only.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Identity with a display name.
    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if known, otherwise the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl Eq for DeviceIdentity {}

impl Hash for DeviceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.to_ascii_uppercase().hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} [{}]", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Which of the two service records a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustMode {
    Secure,
    Insecure,
}

impl TrustMode {
    pub fn uuid(&self) -> Uuid {
        match self {
            TrustMode::Secure => SECURE_UUID,
            TrustMode::Insecure => INSECURE_UUID,
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            TrustMode::Secure => SECURE_NAME,
            TrustMode::Insecure => INSECURE_NAME,
        }
    }

    pub fn from_secure(secure: bool) -> Self {
        if secure {
            TrustMode::Secure
        } else {
            TrustMode::Insecure
        }
    }
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustMode::Secure => write!(f, "secure"),
            TrustMode::Insecure => write!(f, "insecure"),
        }
    }
}

/// How a session came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    ServerSecure,
    ServerInsecure,
    ClientSecure,
    ClientInsecure,
}

impl SessionRole {
    pub fn server(mode: TrustMode) -> Self {
        match mode {
            TrustMode::Secure => SessionRole::ServerSecure,
            TrustMode::Insecure => SessionRole::ServerInsecure,
        }
    }

    pub fn client(mode: TrustMode) -> Self {
        match mode {
            TrustMode::Secure => SessionRole::ClientSecure,
            TrustMode::Insecure => SessionRole::ClientInsecure,
        }
    }

    pub fn trust_mode(&self) -> TrustMode {
        match self {
            SessionRole::ServerSecure | SessionRole::ClientSecure => TrustMode::Secure,
            SessionRole::ServerInsecure | SessionRole::ClientInsecure => TrustMode::Insecure,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, SessionRole::ServerSecure | SessionRole::ServerInsecure)
    }
}
