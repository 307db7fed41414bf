//! Configuration handling for the federation node.
//!
//! Reads the node configuration file and applies environment variable
//! overrides, providing a unified configuration interface for the binary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// A federation peer to dial at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Destination domain of the outbound stream.
    pub domain: String,
    /// Socket address to connect to, e.g. `10.0.0.2:5269`.
    pub addr: String,
}

/// Federation node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local domain, used as the origin of outbound streams.
    pub domain: String,
    /// Port to accept federation connections on.
    pub listen_port: u16,
    /// Seconds of inactivity before an idle session is closed.
    pub idle_timeout_secs: u64,
    /// Peers to dial at startup.
    pub peers: Vec<PeerConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            listen_port: 5269,
            idle_timeout_secs: 300,
            peers: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file and environment variables.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<NodeConfig>(&content) {
                Ok(parsed) => {
                    config = parsed;
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                }
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();

        info!(
            "Final node configuration: domain={}, listen_port={}, peers={}",
            config.domain,
            config.listen_port,
            config.peers.len()
        );

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_environment_overrides(&mut self) {
        if let Ok(domain) = std::env::var("FEDLINK_DOMAIN") {
            info!("Domain overridden by environment: {}", domain);
            self.domain = domain;
        }

        if let Ok(listen_port) = std::env::var("FEDLINK_LISTEN_PORT") {
            if let Ok(port) = listen_port.parse::<u16>() {
                info!("Listen port overridden by environment: {}", port);
                self.listen_port = port;
            }
        }

        if let Ok(idle_timeout) = std::env::var("FEDLINK_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = idle_timeout.parse::<u64>() {
                info!("Idle timeout overridden by environment: {}s", secs);
                self.idle_timeout_secs = secs;
            }
        }
    }
}
