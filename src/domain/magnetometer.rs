//! Magnetometer auto-calibration.
//!
//! The glasses report raw magnetometer counts with unknown per-axis offset
//! and gain. This filter tracks the observed min/max per axis and, once the
//! spread is wide enough to trust, normalizes readings into [-1, 1] and runs
//! them through a one-pole low-pass. Pure numeric state, no I/O; one
//! instance per session, touched only from the reader thread.

use thiserror::Error;

/// Default one-pole low-pass cutoff, Hz.
pub const DEFAULT_CUTOFF_HZ: f32 = 100.0;
/// Default minimum per-axis raw spread before normalization engages.
pub const DEFAULT_MIN_RANGE: i32 = 200;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("calibration data must have exactly 6 elements, got {len}")]
pub struct InvalidCalibrationData {
    pub len: usize,
}

/// Online auto-ranging magnetometer filter.
#[derive(Debug, Clone)]
pub struct MagnetometerCalibrator {
    cutoff_hz: f32,
    min_range: i32,

    min_values: [i32; 3],
    max_values: [i32; 3],
    /// Extrema hold real observations (seeded by a sample or a restore).
    has_extrema: bool,

    prev_filtered: [f32; 3],
    /// Next processed sample seeds the filter memory instead of filtering.
    first_sample: bool,
}

impl MagnetometerCalibrator {
    pub fn new(cutoff_hz: f32, min_range: i32) -> Self {
        Self {
            cutoff_hz,
            min_range,
            min_values: [0; 3],
            max_values: [0; 3],
            has_extrema: false,
            prev_filtered: [0.0; 3],
            first_sample: true,
        }
    }

    /// Feed one raw magnetometer reading; returns the normalized, filtered
    /// vector. Until every axis has seen a spread of at least `min_range`
    /// raw units the output is all zeros.
    pub fn process(&mut self, raw: [i32; 3], delta_time_s: f32) -> [f32; 3] {
        self.update_min_max(raw);

        let range_met = (0..3).all(|i| self.max_values[i] - self.min_values[i] >= self.min_range);

        let mut normalized = [0.0f32; 3];
        if range_met {
            for i in 0..3 {
                let center = (self.max_values[i] + self.min_values[i]) / 2;
                let half_range = (self.max_values[i] - self.min_values[i]) / 2;
                normalized[i] = (raw[i] - center) as f32 / half_range as f32;
            }
        }

        if self.first_sample {
            self.prev_filtered = normalized;
            self.first_sample = false;
            return normalized;
        }

        let alpha = 1.0 / (1.0 + delta_time_s * self.cutoff_hz);
        let mut filtered = [0.0f32; 3];
        for i in 0..3 {
            filtered[i] = alpha * self.prev_filtered[i] + (1.0 - alpha) * normalized[i];
        }
        self.prev_filtered = filtered;
        filtered
    }

    fn update_min_max(&mut self, raw: [i32; 3]) {
        if self.has_extrema {
            for i in 0..3 {
                self.min_values[i] = self.min_values[i].min(raw[i]);
                self.max_values[i] = self.max_values[i].max(raw[i]);
            }
        } else {
            self.min_values = raw;
            self.max_values = raw;
            self.has_extrema = true;
        }
    }

    /// Snapshot the extrema as `[min_x, min_y, min_z, max_x, max_y, max_z]`,
    /// or `None` if no sample was ever observed or restored.
    pub fn save_calibration(&self) -> Option<[i32; 6]> {
        if !self.has_extrema {
            return None;
        }
        let mut data = [0i32; 6];
        data[..3].copy_from_slice(&self.min_values);
        data[3..].copy_from_slice(&self.max_values);
        Some(data)
    }

    /// Restore previously saved extrema. Filter memory is zeroed and the
    /// next sample filters immediately. State is untouched on error.
    pub fn restore_calibration(&mut self, data: &[i32]) -> Result<(), InvalidCalibrationData> {
        if data.len() != 6 {
            return Err(InvalidCalibrationData { len: data.len() });
        }
        self.min_values.copy_from_slice(&data[..3]);
        self.max_values.copy_from_slice(&data[3..]);
        self.has_extrema = true;
        self.prev_filtered = [0.0; 3];
        self.first_sample = false;
        Ok(())
    }

    /// Force the next sample to re-seed the filter memory. Extrema are kept.
    pub fn reset_calibration(&mut self) {
        self.first_sample = true;
    }
}

impl Default for MagnetometerCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_CUTOFF_HZ, DEFAULT_MIN_RANGE)
    }
}
