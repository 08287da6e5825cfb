use ndarray::Array2;

use super::constants::N_BLTS;
use super::error::RecordError;

/// Which instrument subsystem produced the raw records. The calibration
/// engine applies different transfer chains per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Lfr,
    TdsCwf,
    TdsRswf,
}

impl SourceKind {
    pub fn is_lfr(&self) -> bool {
        matches!(self, SourceKind::Lfr)
    }

    pub fn is_tds_cwf(&self) -> bool {
        matches!(self, SourceKind::TdsCwf)
    }
}

/// Per-record instrument configuration, stored as parallel arrays.
///
/// Together with the two calibration-time index arrays obtained from the
/// calibration engine, these fields form the tuple that decides segment
/// membership (see [`crate::segment::segment_records`]).
#[derive(Debug, Clone, Default)]
pub struct ConfigArrays {
    /// Mux mode code, 0-7. Selects which antennas feed which BLTS channels.
    pub mux_mode: Vec<u8>,
    /// Differential gain selection handed through to the calibration engine.
    pub diff_gain: Vec<u8>,
    /// Latching relay state; true routes the 1-2 antenna pair to the
    /// "12-or-13" differential roles, false the 1-3 pair.
    pub latching_relay: Vec<bool>,
    /// Nominal sampling frequency, Hz. Piecewise constant by construction.
    pub sample_freq_hz: Vec<f64>,
    /// Calibration table selection pair handed through to the engine.
    pub calib_table_index: Vec<[u16; 2]>,
    /// Use-fill-value flag set by upstream normalization.
    pub ufv: Vec<bool>,
}

/// A full set of raw, time-tagged telemetry records.
///
/// All per-record containers hold exactly one row per record. Timestamps are
/// nanosecond ticks on a continuous TT2000-style scale (see
/// [`crate::downsample::tick_to_epoch`]). Each BLTS block is N x W where W is
/// the snapshot width; scalar-per-record streams have W = 1.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub epoch: Vec<i64>,
    pub blts: [Array2<f64>; N_BLTS],
    /// Valid sample count per record, at most the snapshot width.
    pub samples_per_record: Vec<u32>,
    pub source: SourceKind,
    pub config: ConfigArrays,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    /// Snapshot width W shared by all five BLTS blocks.
    pub fn snapshot_width(&self) -> usize {
        self.blts[0].ncols()
    }

    /// Check every shape invariant before any processing happens.
    ///
    /// A violation here is a configuration bug in the caller, not a data
    /// anomaly, so it aborts the run.
    pub fn validate(&self) -> Result<(), RecordError> {
        let n = self.len();
        let w = self.snapshot_width();

        for (ch, block) in self.blts.iter().enumerate() {
            if block.nrows() != n {
                return Err(RecordError::ShapeMismatch {
                    name: BLTS_NAMES[ch],
                    found: block.nrows(),
                    expected: n,
                });
            }
            if block.ncols() != w {
                return Err(RecordError::ShapeMismatch {
                    name: BLTS_NAMES[ch],
                    found: block.ncols(),
                    expected: w,
                });
            }
        }

        check_len("samples_per_record", self.samples_per_record.len(), n)?;
        check_len("mux_mode", self.config.mux_mode.len(), n)?;
        check_len("diff_gain", self.config.diff_gain.len(), n)?;
        check_len("latching_relay", self.config.latching_relay.len(), n)?;
        check_len("sample_freq_hz", self.config.sample_freq_hz.len(), n)?;
        check_len("calib_table_index", self.config.calib_table_index.len(), n)?;
        check_len("ufv", self.config.ufv.len(), n)?;

        for (i, spr) in self.samples_per_record.iter().enumerate() {
            if *spr as usize > w {
                return Err(RecordError::BadSampleCount {
                    record: i,
                    declared: *spr,
                    width: w,
                });
            }
        }

        for i in 1..n {
            if self.epoch[i] <= self.epoch[i - 1] {
                return Err(RecordError::NonMonotonicEpoch(i));
            }
        }

        Ok(())
    }
}

const BLTS_NAMES: [&str; N_BLTS] = ["blts_1", "blts_2", "blts_3", "blts_4", "blts_5"];

fn check_len(name: &'static str, found: usize, expected: usize) -> Result<(), RecordError> {
    if found != expected {
        Err(RecordError::ShapeMismatch {
            name,
            found,
            expected,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn test_record_set(n: usize, w: usize) -> RecordSet {
        RecordSet {
            epoch: (0..n as i64).map(|i| i * 1_000_000_000).collect(),
            blts: std::array::from_fn(|ch| {
                Array2::from_shape_fn((n, w), |(i, j)| (ch * 100 + i * 10 + j) as f64)
            }),
            samples_per_record: vec![w as u32; n],
            source: SourceKind::Lfr,
            config: ConfigArrays {
                mux_mode: vec![0; n],
                diff_gain: vec![1; n],
                latching_relay: vec![true; n],
                sample_freq_hz: vec![256.0; n],
                calib_table_index: vec![[0, 0]; n],
                ufv: vec![false; n],
            },
        }
    }

    #[test]
    fn test_valid_set() {
        let records = test_record_set(4, 3);
        assert!(records.validate().is_ok());
        assert_eq!(records.len(), 4);
        assert_eq!(records.snapshot_width(), 3);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut records = test_record_set(4, 3);
        records.config.mux_mode.pop();
        match records.validate() {
            Err(RecordError::ShapeMismatch { name, .. }) => assert_eq!(name, "mux_mode"),
            _ => panic!(),
        }
    }

    #[test]
    fn test_non_monotonic_epoch() {
        let mut records = test_record_set(4, 1);
        records.epoch[2] = records.epoch[1];
        match records.validate() {
            Err(RecordError::NonMonotonicEpoch(i)) => assert_eq!(i, 2),
            _ => panic!(),
        }
    }

    #[test]
    fn test_bad_sample_count() {
        let mut records = test_record_set(4, 3);
        records.samples_per_record[1] = 7;
        assert!(records.validate().is_err());
    }
}
