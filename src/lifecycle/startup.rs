//! Startup orchestration shared by both binaries.
//!
//! # Responsibilities
//! - Parse the common command line (`--config`, `--http-port`)
//! - Load and validate configuration (defaults when no file is given)
//! - Initialize logging and metrics
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Logging is initialized before anything that might log

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use serde::de::DeserializeOwned;

use crate::config::{load_config, ConfigError, ListenerConfig, ObservabilityConfig, Validate, ValidationError};
use crate::observability::{logging, metrics};

/// Command-line options common to every binary.
#[derive(Debug, Clone, Args)]
pub struct StartupArgs {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the port of the listener's bind address.
    #[arg(long, value_name = "PORT")]
    pub http_port: Option<u16>,
}

impl StartupArgs {
    /// Load the configuration file (or defaults) and apply CLI overrides.
    pub fn load<T>(&self, listener: impl Fn(&mut T) -> &mut ListenerConfig) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Validate + Default,
    {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => T::default(),
        };
        if let Some(port) = self.http_port {
            override_port(listener(&mut config), port)?;
        }
        Ok(config)
    }
}

/// Replace the port of `listener.bind_address`.
pub fn override_port(listener: &mut ListenerConfig, port: u16) -> Result<(), ConfigError> {
    let mut addr: SocketAddr = listener.bind_address.parse().map_err(|_| {
        ConfigError::Validation(vec![ValidationError {
            field: "listener.bind_address".into(),
            message: format!("`{}` is not a socket address", listener.bind_address),
        }])
    })?;
    addr.set_port(port);
    listener.bind_address = addr.to_string();
    Ok(())
}

/// Install the log subscriber and, if enabled, the metrics exporter.
pub fn init_observability(config: &ObservabilityConfig) {
    logging::init_logging(&config.log_level);

    if config.metrics_enabled {
        match config.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, ServiceConfig};

    #[test]
    fn test_port_override() {
        let args = StartupArgs {
            config: None,
            http_port: Some(9100),
        };
        let config: GatewayConfig = args.load(|c: &mut GatewayConfig| &mut c.listener).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9100");
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addsvc.toml");
        std::fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:7000\"\n").unwrap();

        let args = StartupArgs {
            config: Some(path),
            http_port: None,
        };
        let config: ServiceConfig = args.load(|c: &mut ServiceConfig| &mut c.listener).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.sum_limit.capacity, 1);
    }
}
