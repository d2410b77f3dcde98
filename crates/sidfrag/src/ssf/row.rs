//! Fragment row: the nullable per-cycle state of one rotated voice.
//!
//! Nulls are first-class and distinct from 0: a `None` field is state that
//! has been masked out as inaudible or redundant, while `Some(0)` is state
//! the chip is actually holding. All reduction rules operate on this
//! distinction.

use serde::{Deserialize, Serialize};

/// One state-change row of a sound fragment, in the rotated voice view.
///
/// Suffix `1` is the carrier (the voice being analyzed), suffix `3` the
/// modulator (the voice feeding its sync/ring inputs). `clock`,
/// `vbi_frame` and `pr_frame` are offsets from the fragment start; the
/// remaining fields are nullable chip state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsfRow {
    pub clock: u64,
    pub vbi_frame: u64,
    pub pr_frame: u64,

    pub freq1: Option<u16>,
    pub pwduty1: Option<u16>,
    pub gate1: Option<bool>,
    pub sync1: Option<bool>,
    pub ring1: Option<bool>,
    pub test1: Option<bool>,
    pub tri1: Option<bool>,
    pub saw1: Option<bool>,
    pub pulse1: Option<bool>,
    pub noise1: Option<bool>,

    pub atk1: Option<u8>,
    pub dec1: Option<u8>,
    pub sus1: Option<u8>,
    pub rel1: Option<u8>,

    pub vol: Option<u8>,

    pub flt1: Option<bool>,
    pub fltlo: Option<bool>,
    pub fltband: Option<bool>,
    pub flthi: Option<bool>,
    pub fltres: Option<u8>,
    pub fltcoff: Option<u16>,

    pub freq3: Option<u16>,
    pub test3: Option<bool>,
}

impl SsfRow {
    /// True when any waveform bit is actually set.
    pub fn any_waveform(&self) -> bool {
        self.tri1 == Some(true)
            || self.saw1 == Some(true)
            || self.pulse1 == Some(true)
            || self.noise1 == Some(true)
    }

    /// True when the modulator state is audible: hard sync engaged, or
    /// ring modulation against the triangle.
    pub fn modulator_audible(&self) -> bool {
        self.sync1 == Some(true) || (self.ring1 == Some(true) && self.tri1 == Some(true))
    }

    /// Null all modulator-side fields.
    pub fn clear_modulator(&mut self) {
        self.freq3 = None;
        self.test3 = None;
        self.sync1 = None;
        self.ring1 = None;
    }

    /// Equality over every non-timing field, used by squeeze-diff.
    pub fn visible_eq(&self, other: &SsfRow) -> bool {
        self.freq1 == other.freq1
            && self.pwduty1 == other.pwduty1
            && self.gate1 == other.gate1
            && self.sync1 == other.sync1
            && self.ring1 == other.ring1
            && self.test1 == other.test1
            && self.tri1 == other.tri1
            && self.saw1 == other.saw1
            && self.pulse1 == other.pulse1
            && self.noise1 == other.noise1
            && self.atk1 == other.atk1
            && self.dec1 == other.dec1
            && self.sus1 == other.sus1
            && self.rel1 == other.rel1
            && self.vol == other.vol
            && self.flt1 == other.flt1
            && self.fltlo == other.fltlo
            && self.fltband == other.fltband
            && self.flthi == other.flthi
            && self.fltres == other.fltres
            && self.fltcoff == other.fltcoff
            && self.freq3 == other.freq3
            && self.test3 == other.test3
    }

    /// Reassembled carrier control byte, for rate inference.
    ///
    /// Bit layout matches the chip's control register; masked (null) flags
    /// contribute 0. `None` when every flag is masked.
    pub fn control_byte(&self) -> Option<u8> {
        let flags = [
            self.gate1, self.sync1, self.ring1, self.test1, self.tri1, self.saw1, self.pulse1,
            self.noise1,
        ];
        if flags.iter().all(Option::is_none) {
            return None;
        }
        let mut byte = 0u8;
        for (bit, flag) in flags.iter().enumerate() {
            if *flag == Some(true) {
                byte |= 1 << bit;
            }
        }
        Some(byte)
    }

    /// Reassembled filter byte (routing + mode + resonance), for rate
    /// inference. `None` when every filter field is masked.
    pub fn filter_byte(&self) -> Option<u8> {
        if self.flt1.is_none()
            && self.fltlo.is_none()
            && self.fltband.is_none()
            && self.flthi.is_none()
            && self.fltres.is_none()
        {
            return None;
        }
        let mut byte = 0u8;
        if self.flt1 == Some(true) {
            byte |= 0x01;
        }
        if self.fltlo == Some(true) {
            byte |= 0x02;
        }
        if self.fltband == Some(true) {
            byte |= 0x04;
        }
        if self.flthi == Some(true) {
            byte |= 0x08;
        }
        byte |= self.fltres.unwrap_or(0) << 4;
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_row() -> SsfRow {
        SsfRow {
            clock: 0,
            vbi_frame: 0,
            pr_frame: 0,
            freq1: None,
            pwduty1: None,
            gate1: None,
            sync1: None,
            ring1: None,
            test1: None,
            tri1: None,
            saw1: None,
            pulse1: None,
            noise1: None,
            atk1: None,
            dec1: None,
            sus1: None,
            rel1: None,
            vol: None,
            flt1: None,
            fltlo: None,
            fltband: None,
            flthi: None,
            fltres: None,
            fltcoff: None,
            freq3: None,
            test3: None,
        }
    }

    #[test]
    fn test_visible_eq_ignores_timing() {
        let mut a = blank_row();
        a.freq1 = Some(100);
        let mut b = a;
        b.clock = 999;
        b.vbi_frame = 3;
        b.pr_frame = 7;
        assert!(a.visible_eq(&b));
        b.freq1 = Some(101);
        assert!(!a.visible_eq(&b));
    }

    #[test]
    fn test_null_distinct_from_zero() {
        let mut a = blank_row();
        let mut b = blank_row();
        a.vol = Some(0);
        b.vol = None;
        assert!(!a.visible_eq(&b));
    }

    #[test]
    fn test_control_byte_packing() {
        let mut row = blank_row();
        assert_eq!(row.control_byte(), None);
        row.gate1 = Some(true);
        row.tri1 = Some(true);
        assert_eq!(row.control_byte(), Some(0x11));
        row.noise1 = Some(false);
        assert_eq!(row.control_byte(), Some(0x11));
    }

    #[test]
    fn test_filter_byte_packing() {
        let mut row = blank_row();
        assert_eq!(row.filter_byte(), None);
        row.flt1 = Some(true);
        row.fltlo = Some(true);
        row.fltres = Some(0x0F);
        assert_eq!(row.filter_byte(), Some(0xF3));
    }

    #[test]
    fn test_modulator_audible_rules() {
        let mut row = blank_row();
        assert!(!row.modulator_audible());
        row.sync1 = Some(true);
        assert!(row.modulator_audible());
        row.sync1 = Some(false);
        row.ring1 = Some(true);
        assert!(!row.modulator_audible());
        row.tri1 = Some(true);
        assert!(row.modulator_audible());
    }
}
