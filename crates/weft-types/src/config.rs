use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, WeftError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub bind_addr: String,
    pub port: u16,
    #[serde(default)]
    pub static_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodecConfig {
    pub target_width: u32,
    pub target_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    pub default_list_limit: usize,
    pub max_list_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub server_url: String,
    pub reconnect_delay_ms: u64,
    pub idle_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    pub network: NetworkConfig,
    pub codec: CodecConfig,
    pub storage: StorageConfig,
    pub ops: OpsConfig,
    pub viewer: ViewerConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 3000,
            static_dir: None,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            target_width: 80,
            target_height: 160,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/nfc_events.db".into(),
            default_list_limit: 50,
            max_list_limit: 1200,
        }
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".into(),
            reconnect_delay_ms: 5_000,
            idle_timeout_ms: 60_000,
            keepalive_interval_ms: 30_000,
            settle_delay_ms: 2_000,
            frame_width: 320,
            frame_height: 320,
        }
    }
}

impl WeftConfig {
    pub fn defaults() -> Self {
        Self {
            network: NetworkConfig::default(),
            codec: CodecConfig::default(),
            storage: StorageConfig::default(),
            ops: OpsConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            WeftError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            WeftError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.port == 0 {
            return Err(WeftError::Configuration(
                "network.port must be a valid port (>0)".into(),
            ));
        }
        if self.codec.target_width == 0 || self.codec.target_height == 0 {
            return Err(WeftError::Configuration(
                "codec target dimensions must be greater than zero".into(),
            ));
        }
        if self.storage.default_list_limit == 0 {
            return Err(WeftError::Configuration(
                "storage.default_list_limit must be greater than zero".into(),
            ));
        }
        if self.storage.default_list_limit > self.storage.max_list_limit {
            return Err(WeftError::Configuration(
                "storage.default_list_limit must not exceed storage.max_list_limit".into(),
            ));
        }
        if self.viewer.reconnect_delay_ms == 0 {
            return Err(WeftError::Configuration(
                "viewer.reconnect_delay_ms must be greater than zero".into(),
            ));
        }
        if self.viewer.idle_timeout_ms == 0 || self.viewer.keepalive_interval_ms == 0 {
            return Err(WeftError::Configuration(
                "viewer timers must be greater than zero".into(),
            ));
        }
        if self.viewer.frame_width == 0 || self.viewer.frame_height == 0 {
            return Err(WeftError::Configuration(
                "viewer frame dimensions must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_weft_config_from_file() {
        let dir = tempfile_dir();
        let temp_path = dir.join("weft-config-test.toml");
        let mut config = WeftConfig::defaults();
        config.network.port = 3100;
        config.codec.target_height = 80;
        config.storage.database_path = "events.db".into();
        config.ops.log_file = Some("weft.log".into());

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = WeftConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.network.port, 3100);
        assert_eq!(loaded.codec, config.codec);
        assert_eq!(loaded.storage.database_path, "events.db");
        assert_eq!(loaded.ops.log_file.as_deref(), Some("weft.log"));
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn optional_fields_default_when_omitted() {
        let doc = r#"
            [network]
            bind_addr = "127.0.0.1"
            port = 4000

            [codec]
            target_width = 80
            target_height = 80

            [storage]
            database_path = "x.db"
            default_list_limit = 10
            max_list_limit = 100

            [ops]
            log_level = "debug"

            [viewer]
            server_url = "http://localhost:4000"
            reconnect_delay_ms = 5000
            idle_timeout_ms = 1000
            keepalive_interval_ms = 1000
            settle_delay_ms = 10
            frame_width = 64
            frame_height = 64
        "#;
        let config: WeftConfig = toml::from_str(doc).expect("parse");
        assert!(config.network.static_dir.is_none());
        assert!(config.ops.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = WeftConfig::defaults();
        assert!(config.validate().is_ok());

        config.network.port = 0;
        assert!(config.validate().is_err());
        config.network.port = 3000;

        config.codec.target_width = 0;
        assert!(config.validate().is_err());
        config.codec.target_width = 80;

        config.storage.default_list_limit = 5000;
        assert!(config.validate().is_err());
        config.storage.default_list_limit = 50;

        config.viewer.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());
        config.viewer.reconnect_delay_ms = 5000;

        config.viewer.frame_height = 0;
        assert!(config.validate().is_err());
        config.viewer.frame_height = 320;
        assert!(config.validate().is_ok());
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("weft-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }
}
