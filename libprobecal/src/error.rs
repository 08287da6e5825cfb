use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RecordError {
    #[error("RecordSet arrays disagree on length; {name} has {found} rows but {expected} records are declared")]
    ShapeMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("RecordSet timestamps must strictly increase; violation at record {0}")]
    NonMonotonicEpoch(usize),
    #[error("Record {record} declares {declared} valid samples but the snapshot width is {width}")]
    BadSampleCount {
        record: usize,
        declared: u32,
        width: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum SegmentError {
    #[error("Segmenter was given parallel arrays of unequal length; {name} has {found} rows but {expected} records are declared")]
    ShapeMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum DemuxError {
    #[error("Unknown mux mode {0} found in configuration")]
    UnknownMuxMode(u8),
}

#[derive(Debug, Error)]
pub enum CalibEngineError {
    #[error("Calibration engine failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration engine rejected the request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Calibration failed due to demux error: {0}")]
    DemuxError(#[from] DemuxError),
    #[error("Calibration failed due to engine error: {0}")]
    EngineError(#[from] CalibEngineError),
    #[error("Calibration engine returned {found} samples for a segment holding {expected}")]
    ShapeMismatch { found: usize, expected: usize },
    #[error("Segment [{first}, {last}] is inconsistent with the declared record count {count}")]
    BadSegment {
        first: usize,
        last: usize,
        count: usize,
    },
    #[error("Sampling frequency {0} Hz at record {1} is not usable")]
    BadSamplingFrequency(f64, usize),
    #[error("Sampling frequency {0} Hz at record {1} is not a known LFR frequency")]
    UnknownSamplingFrequency(f64, usize),
    #[error("At least two records are required to estimate sample spacing; got {0}")]
    InsufficientReferenceData(usize),
}

#[derive(Debug, Clone, Error)]
pub enum QualityError {
    #[error("Unknown anomaly identifier: {0}")]
    UnknownAnomalyId(String),
    #[error("Anomaly interval {index} addresses record {record} but only {count} records exist")]
    MaskOutOfRange {
        index: usize,
        record: usize,
        count: usize,
    },
    #[error("Quality overlay was given parallel arrays of unequal length; {name} has {found} rows but {expected} records are declared")]
    ShapeMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum DownsampleError {
    #[error("Downsampling bin length must be positive; got {0} ns")]
    BadBinLength(i64),
    #[error("Downsampler was given parallel arrays of unequal length; {name} has {found} rows but {expected} records are declared")]
    ShapeMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("Downsample bin addresses record {record} but only {count} records exist")]
    RecordOutOfRange { record: usize, count: usize },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Settings failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Settings failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Settings are invalid: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Processing failed due to record error: {0}")]
    RecordError(#[from] RecordError),
    #[error("Processing failed due to segmenter error: {0}")]
    SegmentError(#[from] SegmentError),
    #[error("Processing failed due to calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
    #[error("Processing failed due to quality overlay error: {0}")]
    QualityError(#[from] QualityError),
    #[error("Processing failed due to downsampling error: {0}")]
    DownsampleError(#[from] DownsampleError),
    #[error("Processing failed due to settings error: {0}")]
    SettingsError(#[from] SettingsError),
    #[error("Calibration engine returned {found} calibration-time indices for {expected} records")]
    BadEngineIndexCount { found: usize, expected: usize },
}
