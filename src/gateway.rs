// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::constants::ProtocolVersion;
use crate::devices::{AirCon, AirConStatus, DeviceKey, Room};
use crate::error::{DsAirError, Result};
use crate::event::{EventReceiver, EventSender, event_channel};
use crate::protocol::param::Param;
use crate::session::{HookUpdate, Session};
use crate::transport::direct::DirectTcpTransport;

/// The main public API for talking to a DS-AIR gateway.
///
/// # Example
///
/// ```no_run
/// use dsair_bridge::{AirConStatus, DsAirGateway, GatewayConfig, Switch};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = GatewayConfig::builder().host("192.168.1.110").build();
///     let mut gateway = DsAirGateway::connect(config).await?;
///
///     let mut events = gateway.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     gateway.wait_ready().await?;
///     for ac in gateway.aircons().await {
///         println!("{} ({}): {:?}", ac.display_name(), ac.key(), ac.status.switch);
///     }
///
///     if let Some(ac) = gateway.aircons().await.first() {
///         let on = AirConStatus { switch: Some(Switch::On), ..Default::default() };
///         gateway.control(ac.key(), on).await?;
///     }
///
///     tokio::signal::ctrl_c().await?;
///     gateway.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct DsAirGateway {
    config: GatewayConfig,
    session: Arc<Session>,
    event_tx: EventSender,
    transport: Option<DirectTcpTransport>,
}

impl DsAirGateway {
    /// Connect to a gateway and start discovery.
    ///
    /// Retries on transient errors with exponential backoff. The base delay is
    /// `reconnect_delay_ms` from the config and the maximum number of retries
    /// is `max_connect_retries`.
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        let (event_tx, _event_rx) = event_channel(config.event_capacity);
        let session = Arc::new(Session::new(event_tx.clone()));
        let mut gateway = Self {
            config,
            session,
            event_tx,
            transport: None,
        };
        gateway.connect_with_retries().await?;
        Ok(gateway)
    }

    async fn connect_with_retries(&mut self) -> Result<()> {
        let max_retries = self.config.max_connect_retries;
        let base_delay_ms = self.config.reconnect_delay_ms;

        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = base_delay_ms * (1 << (attempt - 1).min(4));
                warn!(
                    "Connection attempt {} failed, retrying in {:.1}s...",
                    attempt,
                    delay_ms as f64 / 1000.0
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }

            match DirectTcpTransport::connect(&self.config, self.session.clone()).await {
                Ok(transport) => {
                    self.transport = Some(transport);
                    return Ok(());
                }
                Err(e) => {
                    if !e.is_retryable() || attempt == max_retries {
                        return Err(e);
                    }
                    warn!("Connection error (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DsAirError::Disconnected))
    }

    /// Subscribe to gateway events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Wait until every unit has reported its status, bounded by
    /// `ready_timeout_ms`.
    pub async fn wait_ready(&self) -> Result<()> {
        self.session.wait_ready(self.config.ready_timeout()).await
    }

    pub async fn is_ready(&self) -> bool {
        self.session.is_ready().await
    }

    pub async fn is_connected(&self) -> bool {
        match &self.transport {
            Some(t) => t.is_connected().await,
            None => false,
        }
    }

    pub async fn protocol_version(&self) -> ProtocolVersion {
        self.session.protocol_version().await
    }

    // --- Device Accessors ---

    /// Get a snapshot of every climate unit.
    pub async fn aircons(&self) -> Vec<AirCon> {
        self.session.get_aircons().await
    }

    /// Get a snapshot of one unit.
    pub async fn aircon(&self, key: &DeviceKey) -> Option<AirCon> {
        self.session.get_aircon(key).await
    }

    /// Get a snapshot of every room.
    pub async fn rooms(&self) -> Vec<Room> {
        self.session.get_rooms().await
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // --- Commands ---

    /// Apply `status` to a unit. Fire-and-forget: the local status is updated
    /// immediately and the command is queued.
    pub async fn control(&self, key: DeviceKey, status: AirConStatus) -> Result<()> {
        self.session.control(key, status).await
    }

    /// Like [`control`](Self::control) but waits for the gateway to
    /// acknowledge the command.
    pub async fn control_confirmed(&self, key: DeviceKey, status: AirConStatus) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(DsAirError::Disconnected)?;
        let param = self.session.prepare_control(key, status).await?;
        transport.execute(&param).await
    }

    /// Send `param` and wait for the gateway's ack.
    pub async fn execute(&self, param: Param) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(DsAirError::Disconnected)?;
        transport.execute(&param).await
    }

    pub async fn register_status_hook<F>(&self, key: DeviceKey, hook: F)
    where
        F: Fn(&HookUpdate) + Send + Sync + 'static,
    {
        self.session.register_status_hook(key, hook).await;
    }

    /// Drop the connection, discard session state and connect again.
    /// Registered hooks survive.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("Reconnecting to gateway");
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect().await;
        }
        self.session.reset().await;
        self.connect_with_retries().await
    }

    /// Disconnect from the gateway and clean up.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect().await?;
        }
        self.session.reset().await;
        debug!("Gateway disconnected");
        Ok(())
    }
}
