use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ObjError, ObjResult};

/// Configuration for a single node (frontend or storage role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// This node's own listen address, `host:port`. Used both as the HTTP
    /// bind address and as the identity published on the heartbeat bus.
    pub listen_addr: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_header_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory this node owns: `<base_dir>/<listen_addr>/`.
    pub base_dir: PathBuf,
    /// Scratch directory for temp files during ingest/reconstruction.
    pub tmp_dir: PathBuf,
    /// Number of data shards for Reed-Solomon encoding.
    pub data_shards: usize,
    /// Number of parity shards for Reed-Solomon encoding.
    pub parity_shards: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub heartbeat_interval_secs: u64,
    pub peer_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub warn_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                listen_addr: "127.0.0.1:9000".to_string(),
                read_timeout_secs: 10,
                write_timeout_secs: 10,
                max_header_bytes: 1 << 20,
            },
            storage: StorageConfig {
                base_dir: PathBuf::from("/data1"),
                tmp_dir: PathBuf::from("/data1/tmp"),
                data_shards: 4,
                parity_shards: 2,
            },
            bus: BusConfig {
                heartbeat_interval_secs: 1,
                peer_ttl_secs: 1,
                sweep_interval_secs: 5,
                warn_count: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults. Applies the
    /// `LISTEN_ADDR`, `BaseDir`, `TmpDir` environment overrides from spec.md
    /// §6 on top of whatever was loaded, env taking precedence.
    pub fn load_or_default(config_path: Option<PathBuf>) -> ObjResult<Self> {
        let mut config = if let Some(path) = config_path {
            if path.exists() {
                let config_str = std::fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&config_str)
                    .map_err(|e| ObjError::Generic(format!("config parse error: {}", e)))?;
                tracing::info!("loaded configuration from {:?}", path);
                config
            } else {
                tracing::info!("config path {:?} does not exist, using defaults", path);
                Config::default()
            }
        } else {
            tracing::info!("using default configuration");
            Config::default()
        };

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.network.listen_addr = addr;
        }
        if let Ok(base_dir) = std::env::var("BaseDir") {
            config.storage.base_dir = PathBuf::from(base_dir);
        }
        if let Ok(tmp_dir) = std::env::var("TmpDir") {
            config.storage.tmp_dir = PathBuf::from(tmp_dir);
        } else {
            config.storage.tmp_dir = config
                .storage
                .base_dir
                .join(config.network.listen_addr.replace(':', "."));
        }

        Ok(config)
    }

    /// This node's private shard/work tree: `<base_dir>/<listen_addr>/`.
    pub fn node_dir(&self) -> PathBuf {
        self.storage
            .base_dir
            .join(self.network.listen_addr.replace(':', "."))
    }

    /// Shared heartbeat-bus directory, `<base_dir>/bus/` — common to every
    /// node pointed at the same `base_dir`, regardless of role or listen
    /// address, so `FileBus` publishers and subscribers across separate
    /// processes actually meet (spec.md §4.6).
    pub fn bus_root(&self) -> PathBuf {
        self.storage.base_dir.join("bus")
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.network.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.network.write_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.bus.heartbeat_interval_secs)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.bus.peer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.bus.sweep_interval_secs)
    }
}
