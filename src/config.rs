// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::time::Duration;

use crate::constants::DEFAULT_PORT;

/// Configuration for connecting to a DS-AIR gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway IP address or host name
    pub host: String,
    /// Gateway TCP port (default: 8008)
    pub port: u16,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// How long `execute` waits for an ack or command response (default: 5000)
    pub command_timeout_ms: u64,
    /// Heartbeat interval in milliseconds (default: 60000)
    pub heartbeat_interval_ms: u64,
    /// How long `wait_ready` waits for discovery to finish
    pub ready_timeout_ms: u64,
    /// Reconnection delay in milliseconds (base delay for exponential backoff)
    pub reconnect_delay_ms: u64,
    /// Maximum number of connection retries on transient errors (0 = no retries)
    pub max_connect_retries: u32,
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.110".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 10000,
            command_timeout_ms: 5000,
            heartbeat_interval_ms: 60000,
            ready_timeout_ms: 30000,
            reconnect_delay_ms: 5000,
            max_connect_retries: 3,
            event_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Builder for GatewayConfig.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    pub fn ready_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ready_timeout_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_connect_retries(mut self, retries: u32) -> Self {
        self.config.max_connect_retries = retries;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}
