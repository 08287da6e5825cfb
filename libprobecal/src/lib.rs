//! # libprobecal
//!
//! libprobecal is the calibration and downsampling pipeline for raw
//! telemetry from a multi-channel bias/probe front end. It takes
//! time-tagged records (voltages and currents on five BLTS input channels
//! plus the instrument configuration that was active at each record) and
//! produces calibrated, quality-annotated antenna signals, optionally
//! aggregated into fixed-length time bins.
//!
//! ## Pipeline
//!
//! 1. **Segmentation** ([`segment`]): records are partitioned into maximal
//!    contiguous runs sharing one configuration tuple, so expensive
//!    calibration lookups happen once per run instead of once per record.
//! 2. **Channel routing** ([`demux`]): the mux mode and latching relay state
//!    decide which antenna signal each physical channel carries; signals not
//!    directly measured are derived from the fixed linear relations among
//!    the nine antenna signal representations.
//! 3. **Calibration** ([`calib`]): per segment, raw samples are handed to an
//!    external calibration engine and reassembled into full-length output.
//!    The engine is a collaborator behind a trait; this crate contains no
//!    transfer-function math.
//! 4. **Quality overlay** ([`quality`]): an externally supplied table of
//!    named anomaly intervals lowers quality flags, sets bitmask bits, and
//!    forces affected records to fill value, together with configuration
//!    -driven removal of unusable mux modes.
//! 5. **Downsampling** ([`downsample`]): calibrated records are bucketed
//!    into fixed-length, leap-second-aware bins and aggregated with a
//!    per-column median and a modified standard deviation.
//!
//! [`pipeline::process_records`] wires the steps together.
//!
//! ## Settings
//!
//! Pipeline thresholds live in [`config::Settings`], serializable to YAML:
//!
//! ```yml
//! min_samples_per_bin: 1
//! mux_modes_removed:
//! - 5
//! - 6
//! - 7
//! removal_margin_ns: 1000000000
//! bin_length_ns: 10000000000
//! bin_timestamp_offset_ns: 5000000000
//! baseline_quality_flag: 4.0
//! baseline_quality_bitmask: 0
//! ```
//!
//! ## Out of scope
//!
//! File and archive formats, CDF encoding, and the calibration tables
//! themselves are handled by the surrounding tooling; this crate only sees
//! in-memory arrays and the collaborator traits in [`calib`] and
//! [`quality`].
pub mod calib;
pub mod config;
pub mod constants;
pub mod demux;
pub mod downsample;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod segment;
