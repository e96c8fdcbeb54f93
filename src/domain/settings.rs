use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "nreal_air_driver".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Driver configuration.
///
/// Defaults match the Nreal Air glasses; every field is overridable from
/// `config.json` so a firmware revision that moves an endpoint does not need
/// a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    // Fixed interface ids/subclasses on the glasses.
    #[serde(default = "default_imu_interface")]
    pub imu_interface: u8,
    #[serde(default = "default_aux_interface")]
    pub aux_interface: u8,
    #[serde(default = "default_interface_subclass")]
    pub interface_subclass: u8,

    // Expected endpoint addresses; informational, a present-but-mismatched
    // endpoint is accepted with a warning.
    #[serde(default = "default_imu_in_address")]
    pub imu_in_address: u8,
    #[serde(default = "default_imu_out_address")]
    pub imu_out_address: u8,
    #[serde(default = "default_aux_in_address")]
    pub aux_in_address: u8,
    #[serde(default = "default_aux_out_address")]
    pub aux_out_address: u8,

    /// The IMU stream is periodic; a read not completing within this window
    /// means the device is gone.
    #[serde(default = "default_imu_read_timeout_ms")]
    pub imu_read_timeout_ms: u64,
    /// Poll timeout for the auxiliary endpoint; effectively non-blocking.
    #[serde(default = "default_aux_read_timeout_ms")]
    pub aux_read_timeout_ms: u64,
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    /// Bound on waiting for the reader thread to exit cooperatively.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,

    #[serde(default = "default_mag_cutoff_hz")]
    pub mag_cutoff_hz: f32,
    #[serde(default = "default_mag_min_range")]
    pub mag_min_range: i32,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            imu_interface: default_imu_interface(),
            aux_interface: default_aux_interface(),
            interface_subclass: default_interface_subclass(),
            imu_in_address: default_imu_in_address(),
            imu_out_address: default_imu_out_address(),
            aux_in_address: default_aux_in_address(),
            aux_out_address: default_aux_out_address(),
            imu_read_timeout_ms: default_imu_read_timeout_ms(),
            aux_read_timeout_ms: default_aux_read_timeout_ms(),
            start_timeout_ms: default_start_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            event_queue_depth: default_event_queue_depth(),
            mag_cutoff_hz: default_mag_cutoff_hz(),
            mag_min_range: default_mag_min_range(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_vendor_id() -> u16 {
    0x3318
}
fn default_product_id() -> u16 {
    0x0424
}
fn default_imu_interface() -> u8 {
    3
}
fn default_aux_interface() -> u8 {
    4
}
fn default_interface_subclass() -> u8 {
    0
}
fn default_imu_in_address() -> u8 {
    0x84
}
fn default_imu_out_address() -> u8 {
    0x05
}
fn default_aux_in_address() -> u8 {
    0x86
}
fn default_aux_out_address() -> u8 {
    0x07
}
fn default_imu_read_timeout_ms() -> u64 {
    200
}
fn default_aux_read_timeout_ms() -> u64 {
    1
}
fn default_start_timeout_ms() -> u64 {
    200
}
fn default_stop_timeout_ms() -> u64 {
    2000
}
fn default_event_queue_depth() -> usize {
    256
}
fn default_mag_cutoff_hz() -> f32 {
    100.0
}
fn default_mag_min_range() -> i32 {
    200
}

impl DriverConfig {
    /// Load from the per-user config directory, falling back to defaults if
    /// the file does not exist or does not parse.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        Ok(Self::load_from_file(&path).unwrap_or_default())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    fn config_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("NrealAirDriver");
        fs::create_dir_all(&path)?;
        path.push("config.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device() {
        let config = DriverConfig::default();
        assert_eq!(config.vendor_id, 0x3318);
        assert_eq!(config.product_id, 0x0424);
        assert_eq!(config.imu_interface, 3);
        assert_eq!(config.aux_interface, 4);
        assert_eq!(config.stop_timeout_ms, 2000);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: DriverConfig = serde_json::from_str(r#"{"imu_read_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.imu_read_timeout_ms, 500);
        assert_eq!(config.vendor_id, 0x3318);
        assert_eq!(config.mag_min_range, 200);
    }
}
