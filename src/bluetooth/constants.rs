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

//! RFCOMM service record identifiers.
//!
//! Both peers are built with the same pair of UUIDs; nothing is negotiated at
//! runtime.

use uuid::Uuid;

/// Service record requiring link-layer authentication and encryption.
pub const SECURE_UUID: Uuid = Uuid::from_u128(0xfa87c0d0_afac_11de_8a39_0800200c9a66);

/// Service record without authentication requirements.
pub const INSECURE_UUID: Uuid = Uuid::from_u128(0x8ce255c0_200a_11e0_ac64_0800200c9a66);

/// SDP record name for the secure service.
pub const SECURE_NAME: &str = "BluetoothChatSecure";

/// SDP record name for the insecure service.
pub const INSECURE_NAME: &str = "BluetoothChatInsecure";

/// Link defaults.
pub mod defaults {
    /// Bytes requested per read on a session stream.
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// How long a discovery window stays open, in seconds.
    pub const DISCOVERY_WINDOW_SECS: u64 = 5;

    /// Pause before re-listening after an accept error, in milliseconds.
    pub const LISTEN_RETRY_DELAY_MS: u64 = 1000;

    /// Automatic re-listen attempts before giving up.
    pub const LISTEN_RETRY_LIMIT: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_strings() {
        assert_eq!(
            SECURE_UUID.to_string(),
            "fa87c0d0-afac-11de-8a39-0800200c9a66"
        );
        assert_eq!(
            INSECURE_UUID.to_string(),
            "8ce255c0-200a-11e0-ac64-0800200c9a66"
        );
    }
}
