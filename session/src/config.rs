//! Session configuration.

use std::path::Path;
use std::time::Duration;

use schema::RegistryConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Snapshot send policy and shared type registry contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Simulation ticks per second.
    pub tick_speed: u32,
    /// Seconds of sent stores kept per peer as delta bases.
    pub history_seconds: u32,
    /// Ticks between sends while recovering from a lost base.
    pub recover_interval: u32,
    /// Ticks between sends before the first acknowledgement.
    pub init_interval: u32,
    /// Largest delta chunk per message, in bytes.
    pub max_pack_size: usize,
    /// Pack delta words as varints before chunking.
    pub compress: bool,
    /// Milliseconds a freed item id waits before reuse.
    pub id_timeout_ms: u64,
    pub registry: RegistryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_speed: 50,
            history_seconds: 3,
            recover_interval: 50,
            init_interval: 10,
            max_pack_size: wire::MAX_SNAPSHOT_PACKSIZE,
            compress: true,
            id_timeout_ms: 5000,
            registry: RegistryConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SessionError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.tick_speed == 0 {
            return Err(SessionError::InvalidConfig {
                reason: "tick_speed must be positive",
            });
        }
        if self.init_interval == 0 || self.recover_interval == 0 {
            return Err(SessionError::InvalidConfig {
                reason: "send intervals must be positive",
            });
        }
        if self.max_pack_size == 0 {
            return Err(SessionError::InvalidConfig {
                reason: "max_pack_size must be positive",
            });
        }
        Ok(())
    }

    /// Number of ticks of history kept per peer.
    #[must_use]
    pub const fn history_ticks(&self) -> u32 {
        self.tick_speed.saturating_mul(self.history_seconds)
    }

    #[must_use]
    pub const fn id_timeout(&self) -> Duration {
        Duration::from_millis(self.id_timeout_ms)
    }
}
