//! Client configuration.
//!
//! Settings can be built in code, or read from a TOML file whose keys mirror
//! the struct fields. Durations use humantime syntax (`"10s"`, `"1500ms"`).

use crate::ClientError;
use bw_wire::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default router port for the out-of-band protocol
pub const DEFAULT_PORT: u16 = 28589;

/// Connection settings for a Bosswave router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Router host name or address
    pub host: String,
    /// Router port
    pub port: u16,
    /// Upper bound on TCP connect plus handshake
    #[serde(with = "humantime_str")]
    pub connect_timeout: Duration,
    /// Largest frame accepted or sent, in bytes
    pub max_frame_size: usize,
    /// Initial capacity of the receive buffer
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `host:port`, defaults elsewhere
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` form of the router address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ClientError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {:?} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded client configuration from {:?}: router={}, max_frame_size={}",
            path,
            config.addr(),
            config.max_frame_size
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".into()));
        }
        if self.max_frame_size == 0 {
            return Err(ClientError::Config("max_frame_size must be positive".into()));
        }
        Ok(())
    }
}

mod humantime_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
