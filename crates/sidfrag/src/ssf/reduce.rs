//! State reduction passes.
//!
//! Each pass removes state that is inaudible or redundant given the chip's
//! signal routing, so that two fragments that sound identical reduce to
//! identical rows. The pass order matters: the test-prefix mask nulls
//! waveform bits that later passes key off, and the filter/pulse masks read
//! flags that the waveform-combination pass may have cleared.

use super::row::SsfRow;

/// Mask filter cutoff/resonance while no filter mode is engaged.
///
/// With all of `fltlo`, `fltband`, `flthi` clear the filter is out of the
/// signal path and its parameters are inaudible.
pub fn mask_filter_disengaged(rows: &mut [SsfRow]) {
    for row in rows {
        let engaged =
            row.fltlo == Some(true) || row.fltband == Some(true) || row.flthi == Some(true);
        if !engaged {
            row.fltcoff = None;
            row.fltres = None;
        }
    }
}

/// Collapse ADSR state to fragment scope.
///
/// The envelope latches attack/decay at gate-on and release at gate-off;
/// mid-fragment ADSR writes only matter at those two points. Sustain is the
/// first non-zero value seen while gated; a zero sustain together with a
/// zero attack is the common "plucked" idiom and reads as full sustain when
/// `zero_sustain_is_full` is set.
pub fn collapse_adsr(rows: &mut [SsfRow], zero_sustain_is_full: bool) {
    if rows.is_empty() {
        return;
    }

    let gate_off_idx = rows.iter().position(|r| r.gate1 == Some(false));
    let gated_end = gate_off_idx.unwrap_or(rows.len());

    let atk = rows[0].atk1;
    let dec = rows[0].dec1;
    let rel = gate_off_idx.map(|i| rows[i].rel1).unwrap_or(None);

    let mut sus = rows[..gated_end]
        .iter()
        .filter_map(|r| r.sus1)
        .find(|&s| s != 0);
    if sus.is_none() && atk == Some(0) && zero_sustain_is_full {
        sus = Some(15);
    }
    let sus = sus.or(Some(0));

    for row in rows.iter_mut() {
        row.atk1 = None;
        row.dec1 = None;
        row.sus1 = None;
        row.rel1 = None;
    }
    rows[0].atk1 = atk;
    rows[0].dec1 = dec;
    rows[0].sus1 = sus;
    if let Some(i) = gate_off_idx {
        rows[i].rel1 = rel;
    }
}

/// Mask the inaudible leading test run.
///
/// Asserting `test` holds the oscillator reset; state written during a test
/// prefix is musically invisible until the bit clears.
pub fn mask_test_prefix(rows: &mut [SsfRow]) {
    let prefix = rows
        .iter()
        .take_while(|r| r.test1 == Some(true))
        .count();
    for row in &mut rows[..prefix] {
        row.freq1 = None;
        row.tri1 = None;
        row.saw1 = None;
        row.pulse1 = None;
        row.noise1 = None;
        row.flt1 = None;
        row.clear_modulator();
    }
}

/// Resolve waveform-combination oddities.
///
/// - Noise combined with any other waveform locks the noise shift register
///   and outputs silence: all four waveform bits clear.
/// - Ring modulation only applies against the triangle: `ring` without
///   `tri` clears.
/// - A zero-frequency modulator cannot ring or sync anything.
pub fn resolve_waveform_combinations(rows: &mut [SsfRow]) {
    for row in rows {
        if row.noise1 == Some(true)
            && (row.pulse1 == Some(true) || row.saw1 == Some(true) || row.tri1 == Some(true))
        {
            row.tri1 = Some(false);
            row.saw1 = Some(false);
            row.pulse1 = Some(false);
            row.noise1 = Some(false);
        }
        if row.ring1 == Some(true) && row.tri1 != Some(true) {
            row.ring1 = Some(false);
        }
        if row.freq3 == Some(0) {
            if row.ring1 == Some(true) {
                row.ring1 = Some(false);
            }
            if row.sync1 == Some(true) {
                row.sync1 = Some(false);
            }
        }
    }
}

/// Mask modulator state while no modulation route is engaged.
pub fn mask_modulator(rows: &mut [SsfRow]) {
    for row in rows {
        if !row.modulator_audible() {
            row.clear_modulator();
        }
    }
}

/// Mask carrier state while no waveform is selected: the voice outputs
/// nothing, so its frequency, filter routing and modulation inputs are all
/// inaudible.
pub fn mask_carrier_without_waveform(rows: &mut [SsfRow]) {
    for row in rows {
        if !row.any_waveform() {
            row.freq1 = None;
            row.flt1 = None;
            row.clear_modulator();
        }
    }
}

/// Mask filter state on rows where the voice is not filter-routed.
pub fn mask_filter_routing(rows: &mut [SsfRow]) {
    for row in rows {
        if row.flt1 != Some(true) {
            row.fltlo = None;
            row.fltband = None;
            row.flthi = None;
            row.fltres = None;
            row.fltcoff = None;
        }
    }
}

/// Mask pulse width on rows where the pulse waveform is not selected.
pub fn mask_pulse_width(rows: &mut [SsfRow]) {
    for row in rows {
        if row.pulse1 != Some(true) {
            row.pwduty1 = None;
        }
    }
}

/// Trim trailing state.
///
/// The fragment ends at the last row where the oscillator is still doing
/// something audible: `test` clear, or some waveform selected, whichever
/// comes later. Returns `false` when no waveform is ever set and the
/// fragment should be discarded.
pub fn trim_trailing(rows: &mut Vec<SsfRow>) -> bool {
    let last_wave = rows.iter().rposition(|r| r.any_waveform());
    let Some(last_wave) = last_wave else {
        return false;
    };
    let last_test_clear = rows.iter().rposition(|r| r.test1 != Some(true));
    let cut = match last_test_clear {
        Some(i) => i.max(last_wave),
        None => last_wave,
    };
    rows.truncate(cut + 1);
    true
}

/// Discard rows inside the guard window before the next fragment.
///
/// Writes landing just before the next gate-on belong to the next note's
/// setup, not to this fragment. The window is strictly before
/// `next_clock_start`; for the last fragment of a voice that bound is the
/// stream's final cycle, which itself stays in the fragment.
pub fn apply_guard_window(rows: &mut Vec<SsfRow>, next_clock_start: u64, guard: u64) {
    let limit = next_clock_start.saturating_sub(guard);
    rows.retain(|r| r.clock < limit || r.clock >= next_clock_start);
}

/// Squeeze-diff normal form: remove rows whose visible field tuple equals
/// the previous row's.
pub fn squeeze_diff(rows: &mut Vec<SsfRow>) {
    let mut kept: Vec<SsfRow> = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        if kept.last().is_some_and(|prev| prev.visible_eq(&row)) {
            continue;
        }
        kept.push(row);
    }
    *rows = kept;
}

/// True when the fragment produced at least one observable change in
/// frequency, volume or gate between adjacent rows.
pub fn has_observable_change(rows: &[SsfRow]) -> bool {
    rows.windows(2).any(|w| {
        w[0].freq1 != w[1].freq1 || w[0].vol != w[1].vol || w[0].gate1 != w[1].gate1
    })
}

/// True when `test` stays asserted for every row.
pub fn test_set_throughout(rows: &[SsfRow]) -> bool {
    !rows.is_empty() && rows.iter().all(|r| r.test1 == Some(true))
}
