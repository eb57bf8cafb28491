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

//! BlueZ RFCOMM transport.
//!
//! Uses the BlueZ profile API so that both service records get proper SDP
//! entries: a server profile per listening endpoint, and a short-lived client
//! profile per outbound dial.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};

use super::device::{DeviceIdentity, TrustMode};
use super::transport::{BoxedStream, Listener, Transport};
use crate::error::TransportError;

/// RFCOMM transport backed by a BlueZ adapter.
pub struct RfcommTransport {
    session: Session,
    adapter: Adapter,
}

impl RfcommTransport {
    /// Connect to BlueZ and pick an adapter (the default one when `adapter_name` is `None`).
    ///
    /// The adapter is not powered on here; that is left to the platform.
    pub async fn new(adapter_name: Option<&str>) -> Result<Self, TransportError> {
        info!("Initializing RFCOMM transport...");

        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = match adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self { session, adapter })
    }

    /// Set the advertised device name.
    pub async fn set_alias(&self, name: &str) -> Result<(), TransportError> {
        self.adapter.set_alias(name.to_string()).await?;
        info!("Bluetooth name set to: {}", name);
        Ok(())
    }

    /// Already paired devices.
    pub async fn paired_devices(&self) -> Result<Vec<DeviceIdentity>, TransportError> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await? {
            let device = self.adapter.device(addr)?;
            if device.is_paired().await? {
                devices.push(self.identity(addr).await);
            }
        }

        Ok(devices)
    }

    /// Run a discovery window and return every device seen during it.
    pub async fn discover(&self, window: Duration) -> Result<Vec<DeviceIdentity>, TransportError> {
        info!("Scanning for devices for {:?}...", window);

        let events = self.adapter.discover_devices().await?;
        tokio::pin!(events);
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        if seen.insert(addr) {
                            let identity = self.identity(addr).await;
                            debug!("Discovered device: {}", identity);
                            found.push(identity);
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        if found.is_empty() {
            info!("No devices found");
        } else {
            info!("Discovered {} device(s)", found.len());
        }
        Ok(found)
    }

    async fn identity(&self, addr: Address) -> DeviceIdentity {
        let name = match self.adapter.device(addr) {
            Ok(device) => device.name().await.ok().flatten(),
            Err(_) => None,
        };
        match name {
            Some(name) => DeviceIdentity::named(addr.to_string(), name),
            None => DeviceIdentity::new(addr.to_string()),
        }
    }

    fn profile(mode: TrustMode, role: Role) -> Profile {
        let secure = mode == TrustMode::Secure;
        Profile {
            uuid: mode.uuid(),
            name: Some(mode.service_name().to_string()),
            role: Some(role),
            require_authentication: Some(secure),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    async fn is_available(&self) -> bool {
        match self.adapter.is_powered().await {
            Ok(powered) => powered,
            Err(e) => {
                warn!("Adapter query failed: {}", e);
                false
            }
        }
    }

    async fn listen(&self, mode: TrustMode) -> Result<Box<dyn Listener>, TransportError> {
        let handle = self
            .session
            .register_profile(Self::profile(mode, Role::Server))
            .await?;
        info!("RFCOMM {} profile registered (UUID: {})", mode, mode.uuid());

        Ok(Box::new(RfcommListener {
            mode,
            adapter: self.adapter.clone(),
            handle: Some(handle),
        }))
    }

    async fn connect(
        &self,
        peer: &DeviceIdentity,
        mode: TrustMode,
    ) -> Result<BoxedStream, TransportError> {
        let address: Address = peer
            .address()
            .parse()
            .map_err(|_| TransportError::Bluetooth(format!("invalid address {}", peer.address())))?;
        let device = self.adapter.device(address)?;

        // BlueZ hands the socket to a registered client profile, not to the caller.
        let mut handle = self
            .session
            .register_profile(Self::profile(mode, Role::Client))
            .await?;

        let uuid = mode.uuid();
        let dial = device.connect_profile(&uuid);
        tokio::pin!(dial);
        let mut dialed = false;

        let stream = loop {
            tokio::select! {
                res = &mut dial, if !dialed => {
                    res?;
                    dialed = true;
                    debug!("Profile connect to {} returned", peer);
                }
                req = handle.next() => match req {
                    Some(req) => {
                        break req
                            .accept()
                            .map_err(|e| TransportError::Bluetooth(e.to_string()))?;
                    }
                    None => return Err(TransportError::Closed),
                },
            }
        };

        info!("RFCOMM {} connection to {} established", mode, peer);
        Ok(Box::new(ProfileStream {
            stream,
            _profile: Some(handle),
        }))
    }
}

/// Server profile registration; dropping the handle unregisters it.
struct RfcommListener {
    mode: TrustMode,
    adapter: Adapter,
    handle: Option<ProfileHandle>,
}

#[async_trait]
impl Listener for RfcommListener {
    fn mode(&self) -> TrustMode {
        self.mode
    }

    async fn accept(&mut self) -> Result<(BoxedStream, DeviceIdentity), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::Closed)?;
        let req = handle.next().await.ok_or(TransportError::Closed)?;

        let addr = req.device();
        let stream = req
            .accept()
            .map_err(|e| TransportError::Bluetooth(e.to_string()))?;

        let name = match self.adapter.device(addr) {
            Ok(device) => device.name().await.ok().flatten(),
            Err(_) => None,
        };
        let peer = match name {
            Some(name) => DeviceIdentity::named(addr.to_string(), name),
            None => DeviceIdentity::new(addr.to_string()),
        };
        info!("Connection from: {} ({})", peer, self.mode);

        Ok((
            Box::new(ProfileStream {
                stream,
                _profile: None,
            }),
            peer,
        ))
    }

    async fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("RFCOMM {} profile unregistered", self.mode);
        }
    }
}

/// RFCOMM stream that keeps its client profile registered for its lifetime.
struct ProfileStream {
    stream: Stream,
    _profile: Option<ProfileHandle>,
}

impl AsyncRead for ProfileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProfileStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
