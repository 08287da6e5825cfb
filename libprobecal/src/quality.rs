use std::str::FromStr;

use bit_set::BitSet;

use super::constants::{
    BITMASK_FULL_SATURATION, BITMASK_PARTIAL_SATURATION, BITMASK_THRUSTER_FIRING,
};
use super::calib::CalibratedVolts;
use super::config::Settings;
use super::error::QualityError;

/// One entry from the externally supplied anomaly table: the records a named
/// interval overlaps, the interval's symbolic identifier, and its position
/// in the global table (kept for traceability in logs).
#[derive(Debug, Clone)]
pub struct AnomalyMatch {
    pub records: BitSet,
    pub id: String,
    pub table_index: usize,
}

/// The external anomaly interval table. Queried once per invocation.
pub trait AnomalyTable {
    fn lookup(&self, epoch: &[i64]) -> Result<Vec<AnomalyMatch>, QualityError>;
}

/// Known anomaly identifiers. An identifier missing from this list signals a
/// mismatch between the anomaly table and this code, which is a
/// configuration bug, so parsing fails hard instead of skipping the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyId {
    PartialSaturation,
    FullSaturation,
    ThrusterFiring,
}

impl FromStr for AnomalyId {
    type Err = QualityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "PARTIAL_SATURATION" {
            Ok(Self::PartialSaturation)
        } else if s == "FULL_SATURATION" {
            Ok(Self::FullSaturation)
        } else if s == "THRUSTER_FIRING" {
            Ok(Self::ThrusterFiring)
        } else {
            Err(QualityError::UnknownAnomalyId(s.to_string()))
        }
    }
}

/// What one anomaly identifier does to the records it overlaps.
struct AnomalyEffect {
    /// Quality flag is lowered to at most this value (NaN flags stay NaN).
    flag_ceiling: Option<f64>,
    /// Bits OR-ed into the quality bitmask.
    bitmask_or: u16,
    /// The records are additionally forced to fill value.
    force_ufv: bool,
}

impl AnomalyId {
    fn effect(&self) -> AnomalyEffect {
        match self {
            AnomalyId::PartialSaturation => AnomalyEffect {
                flag_ceiling: Some(1.0),
                bitmask_or: BITMASK_PARTIAL_SATURATION,
                force_ufv: false,
            },
            // Full saturation also sets the partial bit: a fully saturated
            // record is partially saturated under any reading of the bit.
            AnomalyId::FullSaturation => AnomalyEffect {
                flag_ceiling: Some(0.0),
                bitmask_or: BITMASK_FULL_SATURATION | BITMASK_PARTIAL_SATURATION,
                force_ufv: true,
            },
            AnomalyId::ThrusterFiring => AnomalyEffect {
                flag_ceiling: Some(1.0),
                bitmask_or: BITMASK_THRUSTER_FIRING,
                force_ufv: false,
            },
        }
    }
}

/// Apply the anomaly table to the per-record quality flag and bitmask.
///
/// `flags` and `bitmask` enter holding the caller's baseline values and are
/// updated in place. Returns the set of records the anomalies force to fill
/// value.
pub fn apply_anomalies(
    n_records: usize,
    matches: &[AnomalyMatch],
    flags: &mut [f64],
    bitmask: &mut [u16],
) -> Result<BitSet, QualityError> {
    check_len("quality_flag", flags.len(), n_records)?;
    check_len("quality_bitmask", bitmask.len(), n_records)?;

    let mut ufv = BitSet::with_capacity(n_records);
    for (index, anomaly) in matches.iter().enumerate() {
        let effect = AnomalyId::from_str(&anomaly.id)?.effect();
        for record in anomaly.records.iter() {
            if record >= n_records {
                return Err(QualityError::MaskOutOfRange {
                    index,
                    record,
                    count: n_records,
                });
            }
            if let Some(ceiling) = effect.flag_ceiling {
                if !flags[record].is_nan() {
                    flags[record] = flags[record].min(ceiling);
                }
            }
            bitmask[record] |= effect.bitmask_or;
            if effect.force_ufv {
                ufv.insert(record);
            }
        }
    }
    Ok(ufv)
}

/// Records whose mux mode is in the removal list, expanded by the settings'
/// time margin on both sides of every contiguous removed range.
///
/// The margin covers front-end settling around a mode change. It is a span
/// of time, not a record count; sampling may be irregular, so each range is
/// widened by scanning timestamps outward from its edges.
pub fn mux_removal_mask(
    epoch: &[i64],
    mux_mode: &[u8],
    settings: &Settings,
) -> Result<BitSet, QualityError> {
    let n = epoch.len();
    check_len("mux_mode", mux_mode.len(), n)?;

    let removed: Vec<bool> = mux_mode
        .iter()
        .map(|code| settings.mux_modes_removed.contains(code))
        .collect();

    let mut mask = BitSet::with_capacity(n);
    let mut i = 0;
    while i < n {
        if !removed[i] {
            i += 1;
            continue;
        }
        let mut j = i;
        while j + 1 < n && removed[j + 1] {
            j += 1;
        }
        let t_lo = epoch[i].saturating_sub(settings.removal_margin_ns);
        let t_hi = epoch[j].saturating_add(settings.removal_margin_ns);
        let mut lo = i;
        while lo > 0 && epoch[lo - 1] >= t_lo {
            lo -= 1;
        }
        let mut hi = j;
        while hi + 1 < n && epoch[hi + 1] <= t_hi {
            hi += 1;
        }
        for record in lo..=hi {
            mask.insert(record);
        }
        i = j + 1;
    }
    Ok(mask)
}

/// Overwrite every calibrated voltage of the given records with NaN.
///
/// Runs after calibration completes, on the union of anomaly-driven,
/// configuration-driven and upstream UFV records.
pub fn apply_ufv(volts: &mut CalibratedVolts, ufv: &BitSet) {
    for record in ufv.iter() {
        for block in volts.blts.iter_mut() {
            block.row_mut(record).fill(f64::NAN);
        }
        for block in volts.asr.iter_mut() {
            block.row_mut(record).fill(f64::NAN);
        }
    }
}

fn check_len(name: &'static str, found: usize, expected: usize) -> Result<(), QualityError> {
    if found != expected {
        Err(QualityError::ShapeMismatch {
            name,
            found,
            expected,
        })
    } else {
        Ok(())
    }
}
