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

//! RFCOMM link daemon.
//!
//! Listens on both service records (or dials the configured peer), prints
//! whatever arrives and sends each line typed on stdin.

use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rfcomm_link::bluetooth::RfcommTransport;
use rfcomm_link::config::Config;
use rfcomm_link::{ConnectionService, DeviceIdentity, Event};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rfcomm_link=info".parse()?),
        )
        .init();

    info!("Starting RFCOMM link v{}...", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Configuration loaded");

    let transport = RfcommTransport::new(config.adapter.name.as_deref()).await?;
    if let Some(alias) = &config.adapter.alias {
        transport.set_alias(alias).await?;
    }

    match transport.paired_devices().await {
        Ok(devices) => {
            info!("Number of paired devices: {}", devices.len());
            for device in &devices {
                info!("Paired: {}", device);
            }
        }
        Err(e) => warn!("Could not list paired devices: {}", e),
    }

    if config.adapter.discovery_window_secs > 0 {
        let window = Duration::from_secs(config.adapter.discovery_window_secs);
        match transport.discover(window).await {
            Ok(devices) => {
                for device in &devices {
                    info!("Discovered: {}", device);
                }
            }
            Err(e) => warn!("Discovery failed: {}", e),
        }
    }

    let service = ConnectionService::with_config(transport, config.link.clone());
    let mut events = service.subscribe();

    service.start().await?;
    if let Some(address) = &config.adapter.peer {
        service
            .connect(DeviceIdentity::new(address.clone()), config.adapter.secure)
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Ready.");

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                Event::StateChanged(state) => info!("State: {}", state),
                Event::DeviceResolved { peer } => info!("Connected to {}", peer.display_name()),
                Event::MessageReceived(bytes) => {
                    println!("< {}", String::from_utf8_lossy(&bytes));
                }
                Event::MessageSent(bytes) => {
                    println!("> {}", String::from_utf8_lossy(&bytes));
                }
                Event::Notice(text) => info!("{}", text),
                Event::Failed(failure) => warn!("{}", failure),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = service.send(line.into_bytes()).await {
                        error!("Send failed: {}", e);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!("stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.stop().await;
    info!("RFCOMM link stopped");
    Ok(())
}
