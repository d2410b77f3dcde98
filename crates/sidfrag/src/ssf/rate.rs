//! Playroutine rate inference.
//!
//! The host music routine pokes the chip once per call, so any parameter it
//! animates (vibrato on `freq1`, pulse-width sweeps, filter sweeps, waveform
//! tables) changes value on a grid of the call period. The shortest
//! repeating cycle-delta between distinct values of any animated field is
//! therefore the call period itself. Deltas below `ChipClock::rate_min` are
//! write jitter, not calls, and are discarded.

use crate::chip::ChipClock;

use super::row::SsfRow;

/// Inferred timing of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredRate {
    /// Cycles per playroutine call, `None` when no field showed usable
    /// variation. Never exceeds one video frame.
    pub rate: Option<u64>,
    /// Playroutine calls per video frame, clamped to at least 1.
    pub pr_speed: u64,
}

/// Minimum cycle-delta between distinct values of one field series.
///
/// The series is the sub-sequence of rows where the field is non-null;
/// a change point is a row whose value differs from the previous non-null
/// value. Deltas shorter than `rate_min` are dropped.
fn field_min_delta<F>(rows: &[SsfRow], rate_min: u64, value: F) -> Option<u64>
where
    F: Fn(&SsfRow) -> Option<u64>,
{
    let mut prev: Option<(u64, u64)> = None; // (clock, value) at last change
    let mut best: Option<u64> = None;
    for row in rows {
        let Some(v) = value(row) else {
            continue;
        };
        match prev {
            None => prev = Some((row.clock, v)),
            Some((prev_clock, prev_v)) => {
                if v != prev_v {
                    let delta = row.clock - prev_clock;
                    if delta >= rate_min && best.is_none_or(|b| delta < b) {
                        best = Some(delta);
                    }
                    prev = Some((row.clock, v));
                }
            }
        }
    }
    best
}

/// Infer the playroutine call period from parameter-change periodicity.
///
/// Scans `freq1`, `pwduty1`, `freq3`, `test3`, `fltcoff`, `fltres`, `vol`
/// and the packed control and filter bytes; the overall minimum surviving
/// delta, clipped at one video frame, is the call period.
pub fn infer_rate(rows: &[SsfRow], clock: ChipClock) -> InferredRate {
    let rate_min = clock.rate_min();
    let cycles_per_frame = clock.cycles_per_frame();

    let candidates = [
        field_min_delta(rows, rate_min, |r| r.freq1.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.pwduty1.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.freq3.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.test3.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.fltcoff.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.fltres.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.vol.map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.control_byte().map(u64::from)),
        field_min_delta(rows, rate_min, |r| r.filter_byte().map(u64::from)),
    ];

    let rate = candidates
        .iter()
        .flatten()
        .min()
        .map(|&delta| delta.min(cycles_per_frame));

    let pr_speed = match rate {
        Some(rate) => {
            let speed = (cycles_per_frame as f64 / rate as f64).round() as u64;
            speed.max(1)
        }
        None => 1,
    };

    InferredRate { rate, pr_speed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(clock: u64, freq: u16) -> SsfRow {
        SsfRow {
            clock,
            vbi_frame: 0,
            pr_frame: 0,
            freq1: Some(freq),
            pwduty1: None,
            gate1: Some(true),
            sync1: None,
            ring1: None,
            test1: Some(false),
            tri1: Some(true),
            saw1: None,
            pulse1: None,
            noise1: None,
            atk1: None,
            dec1: None,
            sus1: None,
            rel1: None,
            vol: Some(15),
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
    fn test_single_speed_from_freq_toggle() {
        // freq1 alternates every PAL frame.
        let rows: Vec<SsfRow> = (0..8)
            .map(|i| row(i * 19_656, if i % 2 == 0 { 4096 } else { 4200 }))
            .collect();
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, Some(19_656));
        assert_eq!(inferred.pr_speed, 1);
    }

    #[test]
    fn test_double_speed() {
        let rows: Vec<SsfRow> = (0..8)
            .map(|i| row(i * 9_828, if i % 2 == 0 { 4096 } else { 4200 }))
            .collect();
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, Some(9_828));
        assert_eq!(inferred.pr_speed, 2);
    }

    #[test]
    fn test_no_variation_yields_null_rate() {
        let rows: Vec<SsfRow> = (0..4).map(|i| row(i * 19_656, 4096)).collect();
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, None);
        assert_eq!(inferred.pr_speed, 1);
    }

    #[test]
    fn test_sub_rate_min_jitter_discarded() {
        // A pair of writes 100 cycles apart is jitter; the frame-spaced
        // changes still dominate.
        let mut rows = vec![row(0, 4096), row(100, 4100)];
        rows.push(row(19_656, 4200));
        rows.push(row(2 * 19_656, 4096));
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, Some(19_556));
        assert_eq!(inferred.pr_speed, 1);
    }

    #[test]
    fn test_rate_clipped_at_one_frame() {
        // Changes slower than the frame rate clip to one frame.
        let rows: Vec<SsfRow> = (0..4)
            .map(|i| row(i * 60_000, if i % 2 == 0 { 4096 } else { 4200 }))
            .collect();
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, Some(19_656));
        assert_eq!(inferred.pr_speed, 1);
    }

    #[test]
    fn test_null_gaps_do_not_break_series() {
        // A masked row between two changes must not register as a change.
        let mut rows = vec![row(0, 4096)];
        let mut gap = row(9_828, 0);
        gap.freq1 = None;
        rows.push(gap);
        rows.push(row(19_656, 4200));
        let inferred = infer_rate(&rows, ChipClock::Pal);
        assert_eq!(inferred.rate, Some(19_656));
    }
}
