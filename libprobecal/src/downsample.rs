use hifitime::{Duration, Epoch};
use ndarray::{Array2, ArrayView2, Axis};

use super::calib::CalibratedVolts;
use super::config::Settings;
use super::constants::{N_ASR, QUALITY_FLAG_MAX};
use super::error::DownsampleError;

const NS_PER_SEC: i64 = 1_000_000_000;

/// Anchor of the nanosecond tick scale: J2000 (2000-01-01T12:00:00 TT),
/// expressed in TAI. Ticks advance uniformly through leap seconds.
fn tick_anchor() -> Epoch {
    Epoch::from_gregorian_tai(2000, 1, 1, 11, 59, 27, 816_000_000)
}

/// Convert a tick on the continuous scale to a hifitime Epoch.
pub fn tick_to_epoch(tick: i64) -> Epoch {
    tick_anchor() + Duration::from_total_nanoseconds(tick as i128)
}

/// Convert a hifitime Epoch to a tick on the continuous scale.
pub fn epoch_to_tick(epoch: Epoch) -> i64 {
    (epoch - tick_anchor()).total_nanoseconds() as i64
}

/// Cumulative UTC leap seconds at an instant, in ticks.
fn leap_offset_ns(at: Epoch) -> i64 {
    at.leap_seconds(true).unwrap_or(0.0).round() as i64 * NS_PER_SEC
}

/// The result of bucketing a timestamp series into fixed-length bins.
///
/// Bins tile the covered range without gaps; empty bins are retained so the
/// output timestamp series stays regular and "no data" stays distinct from
/// "zero". `durations` reports each bin's true extent in ticks, which
/// exceeds the nominal length for a bin containing a positive leap second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownsampleBins {
    pub timestamps: Vec<i64>,
    pub records: Vec<Vec<usize>>,
    pub durations: Vec<i64>,
}

impl DownsampleBins {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Bucket a strictly-increasing timestamp sequence into fixed-length bins
/// anchored at `reference_tick`.
///
/// Bin k nominally covers UTC labels `reference + [k*L, (k+1)*L)`; bins are
/// chosen so the first boundary sits at or before the earliest timestamp and
/// the last at or after the latest. Each record lands in exactly one bin via
/// a half-open test against the boundary ticks. A bin's output timestamp is
/// its start plus `bin_offset_ns` (caller-positioned, not the midpoint).
pub fn downsample(
    timestamps: &[i64],
    reference_tick: i64,
    bin_length_ns: i64,
    bin_offset_ns: i64,
) -> Result<DownsampleBins, DownsampleError> {
    if bin_length_ns <= 0 {
        return Err(DownsampleError::BadBinLength(bin_length_ns));
    }
    if timestamps.is_empty() {
        return Ok(DownsampleBins {
            timestamps: Vec::new(),
            records: Vec::new(),
            durations: Vec::new(),
        });
    }

    let ref_leap = leap_offset_ns(tick_to_epoch(reference_tick));
    // Nominal UTC label of a tick, relative to the reference
    let label = |tick: i64| {
        (tick - reference_tick) - (leap_offset_ns(tick_to_epoch(tick)) - ref_leap)
    };

    let mut k_min = i64::MAX;
    let mut k_max = i64::MIN;
    for &t in timestamps {
        let k = label(t).div_euclid(bin_length_ns);
        k_min = k_min.min(k);
        k_max = k_max.max(k);
    }
    let n_bins = (k_max - k_min + 1) as usize;

    // Boundary k sits where the UTC label reads reference + k*L. Found by
    // fixed-point iteration from below; the cumulative leap count is a step
    // function, so this settles in at most a few passes.
    let mut boundaries = Vec::with_capacity(n_bins + 1);
    for k in k_min..=k_max + 1 {
        let nominal = k * bin_length_ns;
        let mut tick = reference_tick + nominal;
        for _ in 0..4 {
            let adjusted =
                reference_tick + nominal + leap_offset_ns(tick_to_epoch(tick)) - ref_leap;
            if adjusted == tick {
                break;
            }
            tick = adjusted;
        }
        boundaries.push(tick);
    }

    let mut records: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
    let mut bin = 0;
    for (i, &t) in timestamps.iter().enumerate() {
        while bin + 1 < n_bins && t >= boundaries[bin + 1] {
            bin += 1;
        }
        records[bin].push(i);
    }

    let timestamps_out = boundaries[..n_bins]
        .iter()
        .map(|b| b + bin_offset_ns)
        .collect();
    let durations = boundaries.windows(2).map(|b| b[1] - b[0]).collect();

    Ok(DownsampleBins {
        timestamps: timestamps_out,
        records,
        durations,
    })
}

/// Aggregate one bin's science values: per-column median and modified
/// standard deviation.
///
/// The spread is the square root of the squared deviations from the
/// *median*, normalized by N-1. Downstream consumers depend on this exact
/// statistic; it is not interchangeable with a conventional sample standard
/// deviation about the mean.
///
/// Bins holding fewer than `min_samples` records produce NaN throughout;
/// statistics on underpowered samples are suppressed, not computed. A single
/// record yields its values as the median and NaN spread. Zero columns are
/// fine.
pub fn downsample_bin_sci_values(
    rows: ArrayView2<'_, f64>,
    min_samples: usize,
) -> (Vec<f64>, Vec<f64>) {
    let n = rows.nrows();
    let n_cols = rows.ncols();
    let mut median = vec![f64::NAN; n_cols];
    let mut spread = vec![f64::NAN; n_cols];
    if n == 0 || n < min_samples {
        return (median, spread);
    }

    for col in 0..n_cols {
        let column = rows.column(col);
        if column.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mut sorted: Vec<f64> = column.to_vec();
        sorted.sort_by(f64::total_cmp);
        median[col] = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        };
        if n > 1 {
            let squared_sum: f64 = column.iter().map(|v| (v - median[col]).powi(2)).sum();
            spread[col] = (squared_sum / (n as f64 - 1.0)).sqrt();
        }
    }
    (median, spread)
}

/// Aggregate per-record quality values into per-bin values.
///
/// The flag is the minimum over the bin's non-NaN flags; a bin with no
/// usable flag gets the "good" sentinel, since in this encoding it means "no
/// information", not "bad" (deliberately unlike the NaN policy for science
/// values). The bitmask is the bitwise OR, zero when empty.
pub fn downsample_quality(
    flags: &[f64],
    bitmask: &[u16],
    bins: &DownsampleBins,
) -> Result<(Vec<f64>, Vec<u16>), DownsampleError> {
    if bitmask.len() != flags.len() {
        return Err(DownsampleError::ShapeMismatch {
            name: "quality_bitmask",
            found: bitmask.len(),
            expected: flags.len(),
        });
    }

    let mut flag_out = Vec::with_capacity(bins.len());
    let mut bitmask_out = Vec::with_capacity(bins.len());
    for members in &bins.records {
        let mut flag = f64::INFINITY;
        let mut bits = 0u16;
        for &record in members {
            if record >= flags.len() {
                return Err(DownsampleError::RecordOutOfRange {
                    record,
                    count: flags.len(),
                });
            }
            if !flags[record].is_nan() {
                flag = flag.min(flags[record]);
            }
            bits |= bitmask[record];
        }
        flag_out.push(if flag.is_finite() { flag } else { QUALITY_FLAG_MAX });
        bitmask_out.push(bits);
    }
    Ok((flag_out, bitmask_out))
}

/// A full downsampled data product: one row per bin.
#[derive(Debug, Clone)]
pub struct DownsampledDataset {
    pub bins: DownsampleBins,
    pub asr_median: [Array2<f64>; N_ASR],
    pub asr_spread: [Array2<f64>; N_ASR],
    pub quality_flag: Vec<f64>,
    pub quality_bitmask: Vec<u16>,
}

/// Downsample a calibrated record set into the aggregated product.
pub fn downsample_dataset(
    epoch: &[i64],
    volts: &CalibratedVolts,
    flags: &[f64],
    bitmask: &[u16],
    settings: &Settings,
    reference_tick: i64,
) -> Result<DownsampledDataset, DownsampleError> {
    if flags.len() != epoch.len() {
        return Err(DownsampleError::ShapeMismatch {
            name: "quality_flag",
            found: flags.len(),
            expected: epoch.len(),
        });
    }

    let bins = downsample(
        epoch,
        reference_tick,
        settings.bin_length_ns,
        settings.bin_timestamp_offset_ns,
    )?;

    let width = volts.asr[0].ncols();
    let mut asr_median: [Array2<f64>; N_ASR] =
        std::array::from_fn(|_| Array2::from_elem((bins.len(), width), f64::NAN));
    let mut asr_spread = asr_median.clone();

    for (asr, signal) in volts.asr.iter().enumerate() {
        for (bin, members) in bins.records.iter().enumerate() {
            let rows = signal.select(Axis(0), members);
            let (median, spread) =
                downsample_bin_sci_values(rows.view(), settings.min_samples_per_bin);
            for col in 0..width {
                asr_median[asr][[bin, col]] = median[col];
                asr_spread[asr][[bin, col]] = spread[col];
            }
        }
    }

    let (quality_flag, quality_bitmask) = downsample_quality(flags, bitmask, &bins)?;

    Ok(DownsampledDataset {
        bins,
        asr_median,
        asr_spread,
        quality_flag,
        quality_bitmask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    const SEC: i64 = NS_PER_SEC;

    /// A reference tick far from any leap second.
    fn quiet_reference() -> i64 {
        epoch_to_tick(Epoch::from_gregorian_utc(2021, 3, 14, 0, 0, 0, 0))
    }

    #[test]
    fn test_single_timestamp_single_bin() {
        let t0 = quiet_reference();
        let out = downsample(&[t0 + 6 * SEC], t0, 10 * SEC, 5 * SEC).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.timestamps, vec![t0 + 5 * SEC]);
        assert_eq!(out.records, vec![vec![0]]);
        assert_eq!(out.durations, vec![10 * SEC]);
    }

    #[test]
    fn test_boundary_respecting_split() {
        let t0 = quiet_reference();
        let times = [t0 + 66 * SEC, t0 + 72 * SEC, t0 + 78 * SEC];
        let out = downsample(&times, t0, 10 * SEC, 5 * SEC).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.timestamps, vec![t0 + 65 * SEC, t0 + 75 * SEC]);
        assert_eq!(out.records, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_every_record_in_exactly_one_bin() {
        let t0 = quiet_reference();
        let times: Vec<i64> = (0..137).map(|i| t0 + i * 700_000_000 + 13).collect();
        let out = downsample(&times, t0, 3 * SEC, SEC).unwrap();

        let total: usize = out.records.iter().map(|r| r.len()).sum();
        assert_eq!(total, times.len());
        let mut seen = vec![false; times.len()];
        for members in &out.records {
            for &r in members {
                assert!(!seen[r]);
                seen[r] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_empty_bins_are_retained() {
        let t0 = quiet_reference();
        // A 40 s gap leaves three empty 10 s bins in the middle
        let times = [t0 + SEC, t0 + 45 * SEC];
        let out = downsample(&times, t0, 10 * SEC, 0).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out.records[0], vec![0]);
        assert!(out.records[1].is_empty());
        assert!(out.records[2].is_empty());
        assert!(out.records[3].is_empty());
        assert_eq!(out.records[4], vec![1]);
    }

    #[test]
    fn test_empty_input_and_bad_bin_length() {
        let out = downsample(&[], 0, 10 * SEC, 0).unwrap();
        assert!(out.is_empty());
        match downsample(&[0], 0, 0, 0) {
            Err(DownsampleError::BadBinLength(0)) => (),
            _ => panic!(),
        }
    }

    #[test]
    fn test_leap_second_bin_is_longer() {
        // 2016-12-31 ended with a positive leap second
        let t0 = epoch_to_tick(Epoch::from_gregorian_utc(2016, 12, 31, 23, 59, 50, 0));
        let times = [t0 + SEC, t0 + 15 * SEC];
        let out = downsample(&times, t0, 10 * SEC, 0).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.records, vec![vec![0], vec![1]]);
        // The bin spanning midnight carries the extra second of real time
        assert_eq!(out.durations[0], 10 * SEC);
        assert_eq!(out.durations[1], 11 * SEC);
    }

    #[test]
    fn test_sci_values_single_record() {
        let rows = arr2(&[[1.0, 2.0, 3.0]]);
        let (median, spread) = downsample_bin_sci_values(rows.view(), 0);
        assert_eq!(median, vec![1.0, 2.0, 3.0]);
        assert!(spread.iter().all(|s| s.is_nan()));
    }

    #[test]
    fn test_sci_values_two_records() {
        let rows = arr2(&[[1.0, 2.0, 3.0], [2.0, 3.0, 4.0]]);
        let (median, spread) = downsample_bin_sci_values(rows.view(), 0);
        assert_eq!(median, vec![1.5, 2.5, 3.5]);
        let expected = 0.5f64.sqrt();
        for s in spread {
            assert!((s - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sci_values_min_samples_suppression() {
        let rows = arr2(&[[1.0], [2.0], [3.0]]);
        let (median, spread) = downsample_bin_sci_values(rows.view(), 4);
        assert!(median[0].is_nan());
        assert!(spread[0].is_nan());
    }

    #[test]
    fn test_sci_values_empty_bin_zero_columns() {
        let rows = Array2::<f64>::zeros((0, 0));
        let (median, spread) = downsample_bin_sci_values(rows.view(), 0);
        assert!(median.is_empty());
        assert!(spread.is_empty());
    }

    #[test]
    fn test_modified_spread_uses_median_not_mean() {
        // Median 1.0, mean 4/3; the two statistics differ here
        let rows = arr2(&[[1.0], [1.0], [2.0]]);
        let (median, spread) = downsample_bin_sci_values(rows.view(), 0);
        assert_eq!(median[0], 1.0);
        let expected = (1.0f64 / 2.0).sqrt(); // sqrt((0 + 0 + 1) / (3 - 1))
        assert!((spread[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_quality_aggregation() {
        let t0 = quiet_reference();
        let times = [t0 + SEC, t0 + 2 * SEC, t0 + 25 * SEC];
        let bins = downsample(&times, t0, 10 * SEC, 0).unwrap();
        assert_eq!(bins.len(), 3);

        let flags = [3.0, 2.0, f64::NAN];
        let bitmask = [0b01u16, 0b10, 0b100];
        let (flag_out, bits_out) = downsample_quality(&flags, &bitmask, &bins).unwrap();

        assert_eq!(flag_out[0], 2.0);
        // Empty bin: good sentinel, not NaN
        assert_eq!(flag_out[1], QUALITY_FLAG_MAX);
        // All-NaN bin also falls back to the sentinel
        assert_eq!(flag_out[2], QUALITY_FLAG_MAX);

        assert_eq!(bits_out, vec![0b11, 0, 0b100]);
    }
}
