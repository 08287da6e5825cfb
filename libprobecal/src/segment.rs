use super::error::SegmentError;
use super::record::ConfigArrays;

/// A maximal contiguous run of records sharing one configuration tuple.
/// Boundaries are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub first: usize,
    pub last: usize,
}

impl Segment {
    /// Number of records in the segment, always at least one.
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Half-open index range covering the segment.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.last + 1
    }
}

/// Partition `[0, n)` into maximal runs over which `same` holds between
/// every pair of adjacent indices.
///
/// Single linear scan. `n == 0` yields no runs.
pub fn find_constant_runs<F>(n: usize, same: F) -> Vec<Segment>
where
    F: Fn(usize, usize) -> bool,
{
    let mut runs = Vec::new();
    if n == 0 {
        return runs;
    }
    let mut first = 0;
    for i in 1..n {
        if !same(i - 1, i) {
            runs.push(Segment { first, last: i - 1 });
            first = i;
        }
    }
    runs.push(Segment { first, last: n - 1 });
    runs
}

/// Partition the record range into maximal constant-configuration segments.
///
/// The configuration tuple is the eight fields below, compared by value.
/// Floating-point fields use exact equality; configuration values are
/// piecewise constant by construction, never independently computed, so a
/// tolerance would only hide upstream bugs. Array-valued fields (the
/// calibration-table index pair) compare element-wise.
pub fn segment_records(
    cfg: &ConfigArrays,
    cti_low: &[usize],
    cti_high: &[usize],
) -> Result<Vec<Segment>, SegmentError> {
    let n = cfg.mux_mode.len();
    check_len("diff_gain", cfg.diff_gain.len(), n)?;
    check_len("latching_relay", cfg.latching_relay.len(), n)?;
    check_len("sample_freq_hz", cfg.sample_freq_hz.len(), n)?;
    check_len("calib_table_index", cfg.calib_table_index.len(), n)?;
    check_len("ufv", cfg.ufv.len(), n)?;
    check_len("cti_low", cti_low.len(), n)?;
    check_len("cti_high", cti_high.len(), n)?;

    Ok(find_constant_runs(n, |a, b| {
        cfg.mux_mode[a] == cfg.mux_mode[b]
            && cfg.diff_gain[a] == cfg.diff_gain[b]
            && cfg.latching_relay[a] == cfg.latching_relay[b]
            && cfg.sample_freq_hz[a] == cfg.sample_freq_hz[b]
            && cti_low[a] == cti_low[b]
            && cti_high[a] == cti_high[b]
            && cfg.calib_table_index[a] == cfg.calib_table_index[b]
            && cfg.ufv[a] == cfg.ufv[b]
    }))
}

fn check_len(name: &'static str, found: usize, expected: usize) -> Result<(), SegmentError> {
    if found != expected {
        Err(SegmentError::ShapeMismatch {
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

    fn config(n: usize) -> ConfigArrays {
        ConfigArrays {
            mux_mode: vec![0; n],
            diff_gain: vec![1; n],
            latching_relay: vec![true; n],
            sample_freq_hz: vec![256.0; n],
            calib_table_index: vec![[0, 0]; n],
            ufv: vec![false; n],
        }
    }

    #[test]
    fn test_empty_input() {
        let runs = segment_records(&config(0), &[], &[]).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn test_single_run() {
        let n = 6;
        let runs = segment_records(&config(n), &vec![3; n], &vec![1; n]).unwrap();
        assert_eq!(runs, vec![Segment { first: 0, last: 5 }]);
    }

    #[test]
    fn test_boundaries_sit_where_any_field_changes() {
        let n = 8;
        let mut cfg = config(n);
        cfg.mux_mode[3] = 4;
        cfg.mux_mode[4] = 4;
        // Change in the array-valued field also splits
        cfg.calib_table_index[6] = [1, 0];
        cfg.calib_table_index[7] = [1, 0];
        let runs = segment_records(&cfg, &vec![0; n], &vec![0; n]).unwrap();
        assert_eq!(
            runs,
            vec![
                Segment { first: 0, last: 2 },
                Segment { first: 3, last: 4 },
                Segment { first: 5, last: 5 },
                Segment { first: 6, last: 7 },
            ]
        );
    }

    #[test]
    fn test_partition_covers_everything() {
        let n = 16;
        let mut cfg = config(n);
        for i in 0..n {
            cfg.mux_mode[i] = (i / 3) as u8 % 5;
            cfg.ufv[i] = i % 7 == 0;
        }
        let cti_low: Vec<usize> = (0..n).map(|i| i / 5).collect();
        let runs = segment_records(&cfg, &cti_low, &vec![0; n]).unwrap();

        // Contiguous, non-overlapping, union is exactly [0, n)
        assert_eq!(runs[0].first, 0);
        assert_eq!(runs[runs.len() - 1].last, n - 1);
        for pair in runs.windows(2) {
            assert_eq!(pair[0].last + 1, pair[1].first);
        }
        // Constant tuple inside every run
        for run in &runs {
            for i in run.range() {
                assert_eq!(cfg.mux_mode[i], cfg.mux_mode[run.first]);
                assert_eq!(cfg.ufv[i], cfg.ufv[run.first]);
                assert_eq!(cti_low[i], cti_low[run.first]);
            }
        }
        assert_eq!(runs.iter().map(|r| r.len()).sum::<usize>(), n);
    }

    #[test]
    fn test_float_equality_is_exact() {
        let n = 4;
        let mut cfg = config(n);
        cfg.sample_freq_hz[2] = 256.0 + 1e-9;
        cfg.sample_freq_hz[3] = 256.0 + 1e-9;
        let runs = segment_records(&cfg, &vec![0; n], &vec![0; n]).unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let cfg = config(4);
        match segment_records(&cfg, &[0; 3], &[0; 4]) {
            Err(SegmentError::ShapeMismatch { name, .. }) => assert_eq!(name, "cti_low"),
            _ => panic!(),
        }
    }
}
