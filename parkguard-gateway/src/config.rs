//! Gateway configuration and master key storage in PARKGUARD_HOME

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parkguard_proto::ble::{DATA_CHAR_UUID, DEFAULT_DEVICE_NAME, MANUFACTURER_ID};
use parkguard_proto::{PacketCodec, PrefixMode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{ConfigError, KeyError};
use crate::keys::MasterKey;

pub const HOME_ENV: &str = "PARKGUARD_HOME";
pub const MASTER_KEY_ENV: &str = "PARKGUARD_MASTER_KEY";

const CONFIG_FILE: &str = "config.json";
const MASTER_KEY_FILE: &str = "master.key";

/// `$PARKGUARD_HOME`, or `~/.parkguard`, created if needed
pub fn parkguard_home() -> Result<PathBuf, ConfigError> {
    let home = match std::env::var_os(HOME_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".parkguard"),
    };
    fs::create_dir_all(&home)?;
    Ok(home)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Company id the binary broadcasts are published under
    pub manufacturer_id: u16,
    pub prefix_mode: PrefixMode,
    /// Characteristic carrying text notifications in connected mode
    pub data_characteristic: Uuid,
    /// Advertised name to look for in connected mode
    pub device_name: String,
    /// Device identities to process; empty means all
    pub allowed_devices: Vec<String>,
    /// Forget devices that have been silent for this long. Unset keeps
    /// records for the life of the process.
    pub idle_retention_secs: Option<u64>,
    /// Receptions buffered between the radio and the pipeline
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: MANUFACTURER_ID,
            prefix_mode: PrefixMode::Auto,
            data_characteristic: DATA_CHAR_UUID,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            allowed_devices: Vec::new(),
            idle_retention_secs: None,
            channel_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Read `config.json` from `home`, writing the defaults first if absent
    pub fn load_or_create(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        if path.exists() {
            let data = fs::read_to_string(&path)?;
            return Ok(serde_json::from_str(&data)?);
        }

        let config = Self::default();
        fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        info!("wrote default config to {}", path.display());
        Ok(config)
    }

    pub fn codec(&self) -> PacketCodec {
        PacketCodec::new(self.manufacturer_id, self.data_characteristic)
            .with_prefix_mode(self.prefix_mode)
    }

    pub fn idle_retention(&self) -> Option<Duration> {
        self.idle_retention_secs.map(Duration::from_secs)
    }

    pub fn allows(&self, device: &str) -> bool {
        self.allowed_devices.is_empty()
            || self
                .allowed_devices
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(device))
    }
}

/// Load the master key: `PARKGUARD_MASTER_KEY` wins over `master.key` in `home`
pub fn load_master_key(home: &Path) -> Result<MasterKey, KeyError> {
    let from_env = std::env::var(MASTER_KEY_ENV).ok();
    load_master_key_from(from_env.as_deref(), home)
}

pub(crate) fn load_master_key_from(env: Option<&str>, home: &Path) -> Result<MasterKey, KeyError> {
    if let Some(hex) = env.filter(|hex| !hex.trim().is_empty()) {
        return hex.parse();
    }

    let path = home.join(MASTER_KEY_FILE);
    if !path.exists() {
        return Err(KeyError::NotFound(path));
    }
    fs::read_to_string(&path)?.parse()
}

/// Generate a master key and write it to `master.key` in `home`. Never
/// overwrites an existing key.
pub fn create_master_key(home: &Path) -> Result<PathBuf, KeyError> {
    let path = home.join(MASTER_KEY_FILE);
    if path.exists() {
        return Err(KeyError::AlreadyExists(path));
    }

    let key = MasterKey::generate();
    fs::write(&path, key.to_hex())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_home(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("parkguard-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_defaults_when_absent() {
        let home = temp_home("config-defaults");
        let config = GatewayConfig::load_or_create(&home).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert!(home.join(CONFIG_FILE).exists());

        let again = GatewayConfig::load_or_create(&home).unwrap();
        assert_eq!(again, config);
        fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let home = temp_home("config-partial");
        fs::write(
            home.join(CONFIG_FILE),
            r#"{"prefix_mode": "never", "allowed_devices": ["AA:BB:CC:DD:EE:01"]}"#,
        )
        .unwrap();

        let config = GatewayConfig::load_or_create(&home).unwrap();
        assert_eq!(config.prefix_mode, PrefixMode::Never);
        assert_eq!(config.manufacturer_id, 0xFFFF);
        assert!(config.allows("aa:bb:cc:dd:ee:01"));
        assert!(!config.allows("AA:BB:CC:DD:EE:02"));
        fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        assert!(GatewayConfig::default().allows("anything"));
    }

    #[test]
    fn master_key_env_wins_over_file() {
        let home = temp_home("key-env");
        let path = create_master_key(&home).unwrap();
        let from_file = load_master_key_from(None, &home).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), from_file.to_hex());

        let env_hex = "11".repeat(32);
        let from_env = load_master_key_from(Some(&env_hex), &home).unwrap();
        assert_eq!(from_env.to_hex(), env_hex);
        fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn missing_key_is_reported() {
        let home = temp_home("key-missing");
        assert!(matches!(
            load_master_key_from(None, &home),
            Err(KeyError::NotFound(_))
        ));
        fs::remove_dir_all(&home).unwrap();
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let home = temp_home("key-overwrite");
        create_master_key(&home).unwrap();
        assert!(matches!(
            create_master_key(&home),
            Err(KeyError::AlreadyExists(_))
        ));
        fs::remove_dir_all(&home).unwrap();
    }
}
