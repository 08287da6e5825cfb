use ndarray::Array2;

use super::constants::{N_ASR, N_BLTS};
use super::error::DemuxError;

/// Instrument mux mode. Selects which physical antennas feed which BLTS
/// channels. Codes above 7 do not exist in the hardware and indicate an
/// upstream data bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxMode {
    /// Code 0, nominal science configuration.
    Standard,
    /// Code 1, reconfiguration for a failed probe 1.
    Probe1Fail,
    /// Code 2, reconfiguration for a failed probe 2.
    Probe2Fail,
    /// Code 3, reconfiguration for a failed probe 3.
    Probe3Fail,
    /// Code 4, all probes measured single-ended.
    CalMode0,
    /// Code 5, 2.5 V reference on the DC channels, ground on the AC channels.
    CalMode1,
    /// Code 6, all channels grounded.
    CalMode2,
    /// Code 7, undocumented test configuration; nothing can be calibrated.
    CalMode3,
}

impl MuxMode {
    pub fn from_code(code: u8) -> Result<Self, DemuxError> {
        match code {
            0 => Ok(MuxMode::Standard),
            1 => Ok(MuxMode::Probe1Fail),
            2 => Ok(MuxMode::Probe2Fail),
            3 => Ok(MuxMode::Probe3Fail),
            4 => Ok(MuxMode::CalMode0),
            5 => Ok(MuxMode::CalMode1),
            6 => Ok(MuxMode::CalMode2),
            7 => Ok(MuxMode::CalMode3),
            _ => Err(DemuxError::UnknownMuxMode(code)),
        }
    }
}

/// One of the nine antenna signal representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsrId {
    DcV1,
    DcV2,
    DcV3,
    DcV12,
    DcV13,
    DcV23,
    AcV12,
    AcV13,
    AcV23,
}

/// All ASR roles in canonical order. Index into this array matches the
/// layout of [`crate::calib::CalibratedVolts::asr`].
pub const ASR_IDS: [AsrId; N_ASR] = [
    AsrId::DcV1,
    AsrId::DcV2,
    AsrId::DcV3,
    AsrId::DcV12,
    AsrId::DcV13,
    AsrId::DcV23,
    AsrId::AcV12,
    AsrId::AcV13,
    AsrId::AcV23,
];

impl AsrId {
    /// Position in [`ASR_IDS`].
    pub fn index(&self) -> usize {
        match self {
            AsrId::DcV1 => 0,
            AsrId::DcV2 => 1,
            AsrId::DcV3 => 2,
            AsrId::DcV12 => 3,
            AsrId::DcV13 => 4,
            AsrId::DcV23 => 5,
            AsrId::AcV12 => 6,
            AsrId::AcV13 => 7,
            AsrId::AcV23 => 8,
        }
    }
}

/// The role a physical BLTS channel plays under a given routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BltsRole {
    /// Nothing known about the channel content; output is NaN.
    #[default]
    Unknown,
    /// Channel is grounded; raw samples pass through uncalibrated.
    Ground,
    /// Channel sees the 2.5 V calibration reference; raw samples pass through.
    RefVoltage,
    /// Channel carries an antenna signal and goes through calibration.
    Asr(AsrId),
}

/// Assignment of every BLTS channel to a role for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTable {
    pub roles: [BltsRole; N_BLTS],
}

impl RoutingTable {
    /// Compute the routing for a mux mode and latching relay state.
    ///
    /// Pure lookup; no record data involved. The relay selects whether the
    /// "12-or-13" differential roles see the 1-2 or the 1-3 antenna pair.
    pub fn route(mux: MuxMode, latching_relay_using_12: bool) -> Self {
        use AsrId::*;
        use BltsRole::*;

        let dc_1x = if latching_relay_using_12 { DcV12 } else { DcV13 };
        let ac_1x = if latching_relay_using_12 { AcV12 } else { AcV13 };

        let roles = match mux {
            MuxMode::Standard => [Asr(DcV1), Asr(dc_1x), Asr(DcV23), Asr(ac_1x), Asr(AcV23)],
            MuxMode::Probe1Fail => [Asr(DcV2), Asr(DcV3), Asr(DcV23), Asr(ac_1x), Asr(AcV23)],
            MuxMode::Probe2Fail => [Asr(DcV1), Asr(DcV3), Asr(DcV13), Asr(ac_1x), Asr(AcV23)],
            MuxMode::Probe3Fail => [Asr(DcV1), Asr(DcV2), Asr(DcV12), Asr(ac_1x), Asr(AcV23)],
            MuxMode::CalMode0 => [Asr(DcV1), Asr(DcV2), Asr(DcV3), Asr(ac_1x), Asr(AcV23)],
            MuxMode::CalMode1 => [RefVoltage, RefVoltage, RefVoltage, Ground, Ground],
            MuxMode::CalMode2 => [Ground; N_BLTS],
            MuxMode::CalMode3 => [Unknown; N_BLTS],
        };
        RoutingTable { roles }
    }
}

/// The nine ASR signals for one segment, each explicitly nullable.
///
/// `None` means "not measured and not (yet) derivable". Keeping the roles as
/// struct fields rather than map entries makes an undefined ASR a type-level
/// fact.
#[derive(Debug, Clone, Default)]
pub struct AsrArrays {
    pub dc_v1: Option<Array2<f64>>,
    pub dc_v2: Option<Array2<f64>>,
    pub dc_v3: Option<Array2<f64>>,
    pub dc_v12: Option<Array2<f64>>,
    pub dc_v13: Option<Array2<f64>>,
    pub dc_v23: Option<Array2<f64>>,
    pub ac_v12: Option<Array2<f64>>,
    pub ac_v13: Option<Array2<f64>>,
    pub ac_v23: Option<Array2<f64>>,
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
}

impl AsrArrays {
    pub fn get(&self, id: AsrId) -> Option<&Array2<f64>> {
        match id {
            AsrId::DcV1 => self.dc_v1.as_ref(),
            AsrId::DcV2 => self.dc_v2.as_ref(),
            AsrId::DcV3 => self.dc_v3.as_ref(),
            AsrId::DcV12 => self.dc_v12.as_ref(),
            AsrId::DcV13 => self.dc_v13.as_ref(),
            AsrId::DcV23 => self.dc_v23.as_ref(),
            AsrId::AcV12 => self.ac_v12.as_ref(),
            AsrId::AcV13 => self.ac_v13.as_ref(),
            AsrId::AcV23 => self.ac_v23.as_ref(),
        }
    }

    pub fn set(&mut self, id: AsrId, samples: Array2<f64>) {
        let slot = match id {
            AsrId::DcV1 => &mut self.dc_v1,
            AsrId::DcV2 => &mut self.dc_v2,
            AsrId::DcV3 => &mut self.dc_v3,
            AsrId::DcV12 => &mut self.dc_v12,
            AsrId::DcV13 => &mut self.dc_v13,
            AsrId::DcV23 => &mut self.dc_v23,
            AsrId::AcV12 => &mut self.ac_v12,
            AsrId::AcV13 => &mut self.ac_v13,
            AsrId::AcV23 => &mut self.ac_v23,
        };
        *slot = Some(samples);
    }

    /// Fill in ASR signals not directly measured, using the fixed linear
    /// relations among the antenna signals (V12 = V1 - V2 and friends).
    ///
    /// Relations are applied repeatedly until no new signal can be produced,
    /// so chained derivations (e.g. V3 from V1 and V13, then V23 from V2 and
    /// V3) work regardless of which signals were measured.
    pub fn derive_missing(&mut self) {
        use AsrId::*;
        use Op::*;

        const RELATIONS: [(AsrId, AsrId, Op, AsrId); 15] = [
            (DcV12, DcV1, Sub, DcV2),
            (DcV13, DcV1, Sub, DcV3),
            (DcV23, DcV2, Sub, DcV3),
            (DcV12, DcV13, Sub, DcV23),
            (DcV13, DcV12, Add, DcV23),
            (DcV23, DcV13, Sub, DcV12),
            (DcV1, DcV12, Add, DcV2),
            (DcV1, DcV13, Add, DcV3),
            (DcV2, DcV1, Sub, DcV12),
            (DcV2, DcV23, Add, DcV3),
            (DcV3, DcV1, Sub, DcV13),
            (DcV3, DcV2, Sub, DcV23),
            (AcV13, AcV12, Add, AcV23),
            (AcV12, AcV13, Sub, AcV23),
            (AcV23, AcV13, Sub, AcV12),
        ];

        loop {
            let mut changed = false;
            for (target, a, op, b) in RELATIONS {
                changed |= self.derive(target, a, op, b);
            }
            if !changed {
                break;
            }
        }
    }

    fn derive(&mut self, target: AsrId, a: AsrId, op: Op, b: AsrId) -> bool {
        if self.get(target).is_some() {
            return false;
        }
        let (Some(x), Some(y)) = (self.get(a), self.get(b)) else {
            return false;
        };
        let derived = match op {
            Op::Add => x + y,
            Op::Sub => x - y,
        };
        self.set(target, derived);
        true
    }

    /// Materialize the full ASR set, with NaN blocks for every role that was
    /// neither measured nor derivable.
    pub fn into_complete(self, nrows: usize, ncols: usize) -> [Array2<f64>; N_ASR] {
        let mut this = self;
        ASR_IDS.map(|id| match this.take(id) {
            Some(samples) => samples,
            None => Array2::from_elem((nrows, ncols), f64::NAN),
        })
    }

    fn take(&mut self, id: AsrId) -> Option<Array2<f64>> {
        match id {
            AsrId::DcV1 => self.dc_v1.take(),
            AsrId::DcV2 => self.dc_v2.take(),
            AsrId::DcV3 => self.dc_v3.take(),
            AsrId::DcV12 => self.dc_v12.take(),
            AsrId::DcV13 => self.dc_v13.take(),
            AsrId::DcV23 => self.dc_v23.take(),
            AsrId::AcV12 => self.ac_v12.take(),
            AsrId::AcV13 => self.ac_v13.take(),
            AsrId::AcV23 => self.ac_v23.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_route_is_pure() {
        for code in 0..=7u8 {
            let mux = MuxMode::from_code(code).unwrap();
            for relay in [false, true] {
                assert_eq!(
                    RoutingTable::route(mux, relay),
                    RoutingTable::route(mux, relay)
                );
            }
        }
    }

    #[test]
    fn test_unknown_mux_mode_is_fatal() {
        match MuxMode::from_code(8) {
            Err(DemuxError::UnknownMuxMode(8)) => (),
            _ => panic!(),
        }
    }

    #[test]
    fn test_every_channel_has_exactly_one_role() {
        // Totality: all 8 codes route, and a routing covers all 5 channels.
        for code in 0..=7u8 {
            let mux = MuxMode::from_code(code).unwrap();
            let table = RoutingTable::route(mux, true);
            assert_eq!(table.roles.len(), N_BLTS);
        }
    }

    #[test]
    fn test_latching_relay_selects_pair() {
        let with_12 = RoutingTable::route(MuxMode::Standard, true);
        let with_13 = RoutingTable::route(MuxMode::Standard, false);
        assert_eq!(with_12.roles[1], BltsRole::Asr(AsrId::DcV12));
        assert_eq!(with_13.roles[1], BltsRole::Asr(AsrId::DcV13));
        assert_eq!(with_12.roles[3], BltsRole::Asr(AsrId::AcV12));
        assert_eq!(with_13.roles[3], BltsRole::Asr(AsrId::AcV13));
        // The 23 pair does not depend on the relay
        assert_eq!(with_12.roles[2], with_13.roles[2]);
        assert_eq!(with_12.roles[4], with_13.roles[4]);
    }

    #[test]
    fn test_derive_differences_from_single_ended() {
        let mut asr = AsrArrays::default();
        asr.set(AsrId::DcV1, arr2(&[[3.0], [4.0]]));
        asr.set(AsrId::DcV2, arr2(&[[1.0], [1.5]]));
        asr.set(AsrId::DcV3, arr2(&[[0.5], [1.0]]));
        asr.derive_missing();
        assert_eq!(asr.get(AsrId::DcV12).unwrap(), &arr2(&[[2.0], [2.5]]));
        assert_eq!(asr.get(AsrId::DcV13).unwrap(), &arr2(&[[2.5], [3.0]]));
        assert_eq!(asr.get(AsrId::DcV23).unwrap(), &arr2(&[[0.5], [0.5]]));
    }

    #[test]
    fn test_derive_chains() {
        // V1 and V12 measured: V2 follows, then V23 needs V3 which is absent
        let mut asr = AsrArrays::default();
        asr.set(AsrId::DcV1, arr2(&[[3.0]]));
        asr.set(AsrId::DcV12, arr2(&[[2.0]]));
        asr.set(AsrId::DcV23, arr2(&[[0.5]]));
        asr.derive_missing();
        assert_eq!(asr.get(AsrId::DcV2).unwrap(), &arr2(&[[1.0]]));
        assert_eq!(asr.get(AsrId::DcV3).unwrap(), &arr2(&[[0.5]]));
        assert_eq!(asr.get(AsrId::DcV13).unwrap(), &arr2(&[[2.5]]));
    }

    #[test]
    fn test_underivable_roles_are_nan() {
        let mut asr = AsrArrays::default();
        asr.set(AsrId::AcV12, arr2(&[[1.0]]));
        asr.derive_missing();
        // AC 13 and 23 cannot be derived from AC 12 alone
        assert!(asr.get(AsrId::AcV13).is_none());
        let complete = asr.into_complete(1, 1);
        assert!(complete[AsrId::AcV13.index()][[0, 0]].is_nan());
        assert!(complete[AsrId::AcV23.index()][[0, 0]].is_nan());
        assert_eq!(complete[AsrId::AcV12.index()][[0, 0]], 1.0);
    }
}
