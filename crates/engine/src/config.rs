//! Node configuration
//!
//! A small JSON document read at startup:
//!
//! ```json
//! { "TcpPort": 7171, "DataPath": "/var/lib/granary" }
//! ```
//!
//! Both fields have defaults; an absent file is not an error for callers
//! that want the defaults (`NodeConfig::default()`).

use granary_core::{GranaryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default listener port
pub const DEFAULT_TCP_PORT: u16 = 7171;
/// Default data directory
pub const DEFAULT_DATA_PATH: &str = "./granary-data";

/// Startup configuration for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeConfig {
    /// TCP listener port
    pub tcp_port: u16,
    /// Directory holding the transaction log and dumps
    pub data_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            tcp_port: DEFAULT_TCP_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GranaryError::io(format!(
                "config '{}' does not parse: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Set the listener port
    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the data directory
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }
}
