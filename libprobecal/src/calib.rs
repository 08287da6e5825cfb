use ndarray::{s, Array2};

use super::constants::{LFR_SAMPLE_FREQS_HZ, N_ASR, N_BIAS_CURRENTS, N_BLTS};
use super::demux::{AsrArrays, AsrId, BltsRole, MuxMode, RoutingTable};
use super::error::{CalibEngineError, CalibrationError};
use super::record::RecordSet;
use super::segment::{find_constant_runs, Segment};

/// One voltage calibration request covering a whole constant-configuration
/// segment for one BLTS channel.
///
/// `samples` holds the segment's valid samples flattened record-major;
/// `dt_sec` holds one sample spacing per record in the segment.
#[derive(Debug, Clone)]
pub struct VoltageCalibRequest<'a> {
    pub dt_sec: &'a [f64],
    pub samples: &'a [f64],
    pub role: AsrId,
    pub diff_gain: u8,
    pub cti_low: usize,
    pub cti_high: usize,
    /// Position of the sampling frequency in the LFR ladder; None for TDS.
    pub lsf_index: Option<usize>,
    pub calib_table_index: [u16; 2],
    pub is_lfr: bool,
    pub is_tds_cwf: bool,
    /// The segment is marked use-fill-value. The calibration-table index may
    /// then be invalid, so the engine must not trust its lookups.
    pub force_fill: bool,
}

/// The external calibration engine. The only collaborator that may touch
/// disk (calibration tables); from here it is a synchronous, deterministic
/// function of its declared inputs.
pub trait CalibrationEngine {
    /// Convert raw samples to physical units (volts).
    fn calibrate_voltage(
        &self,
        request: &VoltageCalibRequest<'_>,
    ) -> Result<Vec<f64>, CalibEngineError>;

    /// Per timestamp, the index into the low-cadence calibration epoch table.
    fn calib_time_index_low(&self, epoch: &[i64]) -> Vec<usize>;

    /// Per timestamp, the index into the high-cadence calibration epoch table.
    fn calib_time_index_high(&self, epoch: &[i64]) -> Vec<usize>;

    /// Convert raw bias current ticks to physical current for one antenna.
    fn calibrate_current(
        &self,
        raw_ticks: &[f64],
        channel: usize,
        cti_low: usize,
    ) -> Result<Vec<f64>, CalibEngineError>;
}

/// Calibrated output covering the full record range.
///
/// `blts` holds the per-channel results (pass-through for grounded and
/// reference channels); `asr` holds the nine antenna signals in
/// [`crate::demux::ASR_IDS`] order. Positions beyond a record's valid sample
/// count, records routed to unknown roles, and UFV records are NaN.
#[derive(Debug, Clone)]
pub struct CalibratedVolts {
    pub blts: [Array2<f64>; N_BLTS],
    pub asr: [Array2<f64>; N_ASR],
}

/// Run the calibration over every segment and reassemble full-length output.
///
/// Segments are processed independently and share no state; re-running on
/// the same inputs is byte-identical.
pub fn calibrate_records(
    records: &RecordSet,
    cti_low: &[usize],
    cti_high: &[usize],
    segments: &[Segment],
    engine: &dyn CalibrationEngine,
) -> Result<CalibratedVolts, CalibrationError> {
    let n = records.len();
    let w = records.snapshot_width();
    // Spacing is only estimated when a channel actually needs calibration,
    // so pass-through-only data never trips the two-record requirement.
    let mut dt_sec: Option<Vec<f64>> = None;

    let mut blts_out: [Array2<f64>; N_BLTS] =
        std::array::from_fn(|_| Array2::from_elem((n, w), f64::NAN));
    let mut asr_out: [Array2<f64>; N_ASR] =
        std::array::from_fn(|_| Array2::from_elem((n, w), f64::NAN));

    for seg in segments {
        if seg.last >= n || seg.first > seg.last {
            return Err(CalibrationError::BadSegment {
                first: seg.first,
                last: seg.last,
                count: n,
            });
        }

        let cfg = &records.config;
        let i0 = seg.first;
        let mux = MuxMode::from_code(cfg.mux_mode[i0])?;
        let routing = RoutingTable::route(mux, cfg.latching_relay[i0]);
        let seg_ufv = cfg.ufv[i0];
        let lsf_index = lsf_index_for(records, i0)?;

        let mut seg_asr = AsrArrays::default();
        for (ch, role) in routing.roles.iter().enumerate() {
            match role {
                BltsRole::Unknown => (), // stays NaN
                BltsRole::Ground | BltsRole::RefVoltage => {
                    if !seg_ufv {
                        let raw = records.blts[ch].slice(s![seg.range(), ..]);
                        blts_out[ch].slice_mut(s![seg.range(), ..]).assign(&raw);
                    }
                }
                BltsRole::Asr(id) => {
                    if dt_sec.is_none() {
                        dt_sec = Some(record_spacing_seconds(records)?);
                    }
                    let flat = flatten_segment(records, ch, seg);
                    let request = VoltageCalibRequest {
                        dt_sec: &dt_sec.as_deref().unwrap()[seg.range()],
                        samples: &flat,
                        role: *id,
                        diff_gain: cfg.diff_gain[i0],
                        cti_low: cti_low[i0],
                        cti_high: cti_high[i0],
                        lsf_index,
                        calib_table_index: cfg.calib_table_index[i0],
                        is_lfr: records.source.is_lfr(),
                        is_tds_cwf: records.source.is_tds_cwf(),
                        force_fill: seg_ufv,
                    };
                    let calibrated = engine.calibrate_voltage(&request)?;
                    if calibrated.len() != flat.len() {
                        return Err(CalibrationError::ShapeMismatch {
                            found: calibrated.len(),
                            expected: flat.len(),
                        });
                    }
                    // A UFV segment carries a possibly-invalid table index;
                    // whatever the engine produced is overwritten with fill.
                    let block = if seg_ufv {
                        Array2::from_elem((seg.len(), w), f64::NAN)
                    } else {
                        repack_segment(records, seg, w, &calibrated)
                    };
                    blts_out[ch].slice_mut(s![seg.range(), ..]).assign(&block);
                    seg_asr.set(*id, block);
                }
            }
        }

        seg_asr.derive_missing();
        for (slot, block) in asr_out.iter_mut().zip(seg_asr.into_complete(seg.len(), w)) {
            slot.slice_mut(s![seg.range(), ..]).assign(&block);
        }
    }

    Ok(CalibratedVolts {
        blts: blts_out,
        asr: asr_out,
    })
}

/// Calibrate raw bias current ticks into physical currents, one column per
/// antenna. Runs on constant ranges of the low-cadence calibration-time
/// index so the engine resolves each epoch-table entry once.
pub fn calibrate_bias_currents(
    epoch: &[i64],
    raw_currents: &Array2<f64>,
    engine: &dyn CalibrationEngine,
) -> Result<Array2<f64>, CalibrationError> {
    let n = epoch.len();
    if raw_currents.nrows() != n || raw_currents.ncols() != N_BIAS_CURRENTS {
        return Err(CalibrationError::ShapeMismatch {
            found: raw_currents.nrows(),
            expected: n,
        });
    }

    let cti_low = engine.calib_time_index_low(epoch);
    if cti_low.len() != n {
        return Err(CalibrationError::ShapeMismatch {
            found: cti_low.len(),
            expected: n,
        });
    }

    let mut out = Array2::from_elem((n, N_BIAS_CURRENTS), f64::NAN);
    let runs = find_constant_runs(n, |a, b| cti_low[a] == cti_low[b]);
    for run in runs {
        for ch in 0..N_BIAS_CURRENTS {
            let ticks: Vec<f64> = raw_currents.slice(s![run.range(), ch]).to_vec();
            let physical = engine.calibrate_current(&ticks, ch, cti_low[run.first])?;
            if physical.len() != ticks.len() {
                return Err(CalibrationError::ShapeMismatch {
                    found: physical.len(),
                    expected: ticks.len(),
                });
            }
            for (offset, value) in physical.into_iter().enumerate() {
                out[[run.first + offset, ch]] = value;
            }
        }
    }
    Ok(out)
}

/// Per-record sample spacing in seconds.
///
/// Snapshot streams carry their spacing in the sampling frequency field.
/// Scalar streams estimate it from timestamp differences, which needs at
/// least two records; refusing here beats producing a misleading spacing.
fn record_spacing_seconds(records: &RecordSet) -> Result<Vec<f64>, CalibrationError> {
    let n = records.len();
    if records.snapshot_width() > 1 {
        let mut dt = Vec::with_capacity(n);
        for (i, freq) in records.config.sample_freq_hz.iter().enumerate() {
            if *freq <= 0.0 || !freq.is_finite() {
                return Err(CalibrationError::BadSamplingFrequency(*freq, i));
            }
            dt.push(1.0 / freq);
        }
        Ok(dt)
    } else {
        if n < 2 {
            return Err(CalibrationError::InsufficientReferenceData(n));
        }
        let mut dt = Vec::with_capacity(n);
        for i in 0..n - 1 {
            dt.push((records.epoch[i + 1] - records.epoch[i]) as f64 * 1e-9);
        }
        dt.push(dt[n - 2]);
        Ok(dt)
    }
}

/// LSF index for the segment starting at record `i0`; None for TDS sources.
fn lsf_index_for(records: &RecordSet, i0: usize) -> Result<Option<usize>, CalibrationError> {
    if !records.source.is_lfr() {
        return Ok(None);
    }
    let freq = records.config.sample_freq_hz[i0];
    match LFR_SAMPLE_FREQS_HZ.iter().position(|f| *f == freq) {
        Some(index) => Ok(Some(index)),
        None => Err(CalibrationError::UnknownSamplingFrequency(freq, i0)),
    }
}

/// Flatten a segment's valid samples into one record-major value stream.
fn flatten_segment(records: &RecordSet, ch: usize, seg: &Segment) -> Vec<f64> {
    let block = &records.blts[ch];
    let mut flat = Vec::new();
    for i in seg.range() {
        let valid = records.samples_per_record[i] as usize;
        flat.extend(block.row(i).iter().take(valid).copied());
    }
    flat
}

/// Repack a flat calibrated stream into per-record rows of width `w`,
/// preserving the record-to-sample-count map exactly. Positions past a
/// record's valid length are NaN.
fn repack_segment(records: &RecordSet, seg: &Segment, w: usize, flat: &[f64]) -> Array2<f64> {
    let mut block = Array2::from_elem((seg.len(), w), f64::NAN);
    let mut pos = 0;
    for (row, i) in seg.range().enumerate() {
        let valid = records.samples_per_record[i] as usize;
        for col in 0..valid {
            block[[row, col]] = flat[pos];
            pos += 1;
        }
    }
    block
}
