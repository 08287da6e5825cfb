use serde::{Deserialize, Serialize};
use std::path::Path;

use super::constants::QUALITY_FLAG_MAX;
use super::error::SettingsError;

/// Structure representing the pipeline settings. Contains the thresholds and
/// margins consumed by the quality overlay and the downsampler.
/// Settings are serializable and deserializable to YAML using serde and serde_yaml.
///
/// Resolved once at the pipeline boundary and passed by reference into each
/// component; nothing in the pipeline mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bins with fewer contributing records than this yield NaN aggregates.
    pub min_samples_per_bin: usize,
    /// Mux mode codes whose records are forced to fill value.
    pub mux_modes_removed: Vec<u8>,
    /// Symmetric time margin added around each removed mux-mode range, ns.
    pub removal_margin_ns: i64,
    /// Nominal downsampling bin length, ns.
    pub bin_length_ns: i64,
    /// Offset of a bin's output timestamp from the bin start, ns.
    pub bin_timestamp_offset_ns: i64,
    /// Quality flag assigned to every record before the anomaly overlay runs.
    pub baseline_quality_flag: f64,
    /// Quality bitmask assigned to every record before the anomaly overlay runs.
    pub baseline_quality_bitmask: u16,
}

impl Default for Settings {
    /// Generate a new Settings object with the nominal survey-data values
    fn default() -> Self {
        Self {
            min_samples_per_bin: 1,
            mux_modes_removed: vec![5, 6, 7],
            removal_margin_ns: 1_000_000_000,
            bin_length_ns: 10_000_000_000,
            bin_timestamp_offset_ns: 5_000_000_000,
            baseline_quality_flag: QUALITY_FLAG_MAX,
            baseline_quality_bitmask: 0,
        }
    }
}

impl Settings {
    /// Read the settings in a YAML file
    /// Returns a Settings if successful
    pub fn read_settings_file(settings_path: &Path) -> Result<Self, SettingsError> {
        if !settings_path.exists() {
            return Err(SettingsError::BadFilePath(settings_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(settings_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check all value-range constraints at once. Called at the pipeline
    /// boundary so a bad file fails before any data is touched.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.is_bin_length_valid() {
            return Err(SettingsError::InvalidValue(format!(
                "bin_length_ns must be positive, got {}",
                self.bin_length_ns
            )));
        }
        if !self.is_margin_valid() {
            return Err(SettingsError::InvalidValue(format!(
                "removal_margin_ns must be non-negative, got {}",
                self.removal_margin_ns
            )));
        }
        if let Some(code) = self.mux_modes_removed.iter().find(|c| **c > 7) {
            return Err(SettingsError::InvalidValue(format!(
                "mux_modes_removed contains {code}, but mux mode codes are 0-7"
            )));
        }
        Ok(())
    }

    pub fn is_bin_length_valid(&self) -> bool {
        self.bin_length_ns > 0
    }

    pub fn is_margin_valid(&self) -> bool {
        self.removal_margin_ns >= 0
    }
}
