use bit_set::BitSet;

use super::calib::{calibrate_records, CalibratedVolts, CalibrationEngine};
use super::config::Settings;
use super::downsample::{downsample_dataset, DownsampledDataset};
use super::error::{DownsampleError, ProcessError};
use super::quality::{apply_anomalies, apply_ufv, mux_removal_mask, AnomalyTable};
use super::record::RecordSet;
use super::segment::{segment_records, Segment};

/// Everything the pipeline produces for one record set.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub volts: CalibratedVolts,
    pub quality_flag: Vec<f64>,
    pub quality_bitmask: Vec<u16>,
    /// Records whose outputs were overwritten with fill value.
    pub ufv: BitSet,
    /// The constant-configuration segments, kept for diagnostics.
    pub segments: Vec<Segment>,
}

/// The main pipeline: raw records to calibrated, quality-annotated output.
///
/// Sequencing: validate shapes, resolve calibration-time indices, segment,
/// calibrate per segment, overlay anomalies, add configuration-driven UFV,
/// then blank every UFV record. Pure and synchronous throughout; the
/// calibration engine is the only collaborator that may touch disk.
pub fn process_records(
    records: &RecordSet,
    engine: &dyn CalibrationEngine,
    anomalies: &dyn AnomalyTable,
    settings: &Settings,
) -> Result<PipelineOutput, ProcessError> {
    records.validate()?;
    let n = records.len();
    log::info!("Processing {} records...", n);

    let cti_low = engine.calib_time_index_low(&records.epoch);
    let cti_high = engine.calib_time_index_high(&records.epoch);
    for cti in [&cti_low, &cti_high] {
        if cti.len() != n {
            return Err(ProcessError::BadEngineIndexCount {
                found: cti.len(),
                expected: n,
            });
        }
    }

    let segments = segment_records(&records.config, &cti_low, &cti_high)?;
    log::debug!(
        "Partitioned {} records into {} constant-configuration segments.",
        n,
        segments.len()
    );

    let mut volts = calibrate_records(records, &cti_low, &cti_high, &segments, engine)?;

    let mut quality_flag = vec![settings.baseline_quality_flag; n];
    let mut quality_bitmask = vec![settings.baseline_quality_bitmask; n];
    let matches = anomalies.lookup(&records.epoch)?;
    log::debug!("Anomaly table returned {} overlapping intervals.", matches.len());
    let mut ufv = apply_anomalies(n, &matches, &mut quality_flag, &mut quality_bitmask)?;

    ufv.union_with(&mux_removal_mask(
        &records.epoch,
        &records.config.mux_mode,
        settings,
    )?);
    for (record, flagged) in records.config.ufv.iter().enumerate() {
        if *flagged {
            ufv.insert(record);
        }
    }

    apply_ufv(&mut volts, &ufv);
    log::info!(
        "Done; {} of {} records carry fill values.",
        ufv.len(),
        n
    );

    Ok(PipelineOutput {
        volts,
        quality_flag,
        quality_bitmask,
        ufv,
        segments,
    })
}

/// Downsample a processed record set into the aggregated survey product.
pub fn downsample_output(
    records: &RecordSet,
    output: &PipelineOutput,
    settings: &Settings,
    reference_tick: i64,
) -> Result<DownsampledDataset, DownsampleError> {
    downsample_dataset(
        &records.epoch,
        &output.volts,
        &output.quality_flag,
        &output.quality_bitmask,
        settings,
        reference_tick,
    )
}
