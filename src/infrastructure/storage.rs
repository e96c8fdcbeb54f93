//! Persistent calibration storage.
//!
//! The session saves magnetometer extrema at stop and restores them at
//! start; an absent record is the normal uncalibrated state. The store is a
//! trait so tests and embedders can supply their own backend.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key-value boundary for the persisted calibration record.
pub trait CalibrationStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<[i32; 6]>>;
    fn save(&self, data: [i32; 6]) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationRecord {
    magnetometer_calibration: [i32; 6],
}

/// JSON-file backed store in the per-user config directory.
pub struct JsonCalibrationStore {
    path: PathBuf,
}

impl JsonCalibrationStore {
    pub fn new() -> anyhow::Result<Self> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("NrealAirDriver");
        fs::create_dir_all(&path)?;
        path.push("calibration.json");
        Ok(Self { path })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn load(&self) -> anyhow::Result<Option<[i32; 6]>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let record: CalibrationRecord = serde_json::from_str(&contents)?;
        Ok(Some(record.magnetometer_calibration))
    }

    fn save(&self, data: [i32; 6]) -> anyhow::Result<()> {
        let record = CalibrationRecord {
            magnetometer_calibration: data,
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-process store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryCalibrationStore {
    data: Mutex<Option<[i32; 6]>>,
}

impl MemoryCalibrationStore {
    pub fn new(data: Option<[i32; 6]>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&self) -> anyhow::Result<Option<[i32; 6]>> {
        Ok(*self.data.lock().unwrap())
    }

    fn save(&self, data: [i32; 6]) -> anyhow::Result<()> {
        *self.data.lock().unwrap() = Some(data);
        Ok(())
    }
}
