//! Server settings shared by the binary and the tests

use crate::transport::ServerError;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_MAX_CLIENTS: usize = 8;
pub const DEFAULT_RX_CAPACITY: usize = 1024;
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_TICK_RATE: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Slots in the receive ring buffer
    pub rx_capacity: usize,
    /// Silence after which a client is dropped
    pub client_timeout: Duration,
    /// Seed for the simulation RNG; `None` picks one at random
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: DEFAULT_MAX_CLIENTS,
            rx_capacity: DEFAULT_RX_CAPACITY,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.host.is_empty() {
            return Err(ServerError::InvalidAddress(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ServerError::InvalidPort(0));
        }
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ServerError::InvalidConfig(format!(
                "tick rate must be between 1 and {} Hz, got {}",
                MAX_TICK_RATE, self.tick_rate
            )));
        }
        if self.max_clients == 0 {
            return Err(ServerError::InvalidConfig(
                "max clients must be at least 1".to_string(),
            ));
        }
        if self.rx_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "receive buffer capacity must be at least 1".to_string(),
            ));
        }
        if self.client_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "client timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed simulation step
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
