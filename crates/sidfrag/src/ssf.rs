//! Voice splitting: per-voice fragment extraction from dense chip state.
//!
//! This is the core of the pipeline. Each voice's state stream is rotated
//! into a canonical carrier/modulator view, reduced by the masking passes in
//! [`reduce`], segmented at gate-on edges into sound fragments, timed
//! against the inferred playroutine rate and hashed for deduplication.
//!
//! # Voice rotation
//!
//! Sync and ring modulation on voice v are driven by voice (v-1) mod 3 (so
//! voice 1 is modulated by voice 3). Renaming the analyzed voice's fields to
//! suffix "1" and its modulator's to suffix "3" lets every reduction rule be
//! written once: suffix 1 is always the carrier, suffix 3 always the
//! modulator.
//!
//! # Pipeline
//!
//! Per voice (skipping voices whose gate never rises):
//!
//! 1. rotate and select columns; coalesce near-writes on `freq1`,
//!    `pwduty1`, `freq3` (and `fltcoff` before splitting);
//! 2. mask filter parameters while the filter is disengaged;
//! 3. segment at gate-on rising edges;
//! 4. per fragment: collapse ADSR to fragment scope, mask the leading test
//!    run, resolve waveform-combination oddities, mask modulator/carrier/
//!    filter/pulse state that cannot be heard, trim the tail, drop rows in
//!    the guard window before the next fragment, infer the playroutine
//!    rate, rebase time columns, squeeze to diff normal form, drop empty
//!    fragments, hash.
//!
//! # Examples
//!
//! ```rust
//! use sidfrag::chip::ChipClock;
//! use sidfrag::dump::parse_dump;
//! use sidfrag::ssf::{SplitOptions, split_voices};
//! use sidfrag::state::decode_writes;
//!
//! // Volume, frequency, gate on with triangle, long hold, gate off.
//! let dump = "1 24 15\n1 0 0\n1 1 16\n1 4 17\n100000 4 16\n";
//! let rows = decode_writes(&parse_dump(dump, None).unwrap());
//! let out = split_voices(&rows, ChipClock::Pal, &SplitOptions::default());
//! assert_eq!(out.fragments.len(), 1);
//! assert_eq!(out.fragments[0].rows[0].gate1, Some(true));
//! ```

pub mod hash;
pub mod rate;
pub mod reduce;
pub mod row;

pub use rate::InferredRate;
pub use row::SsfRow;

use serde::{Deserialize, Serialize};

use crate::chip::ChipClock;
use crate::state::StateRow;

/// Tunables for voice splitting. The defaults are the analysis constants;
/// `zero_sustain_is_full` is the sustain heuristic knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    /// Window within which a second write to the same field shadows the
    /// first.
    pub near_write_cycles: u64,
    /// Rows this close to the next gate-on belong to the next note's setup.
    pub guard_cycles: u64,
    /// Read a zero sustain with a zero attack as full sustain (the
    /// "plucked" envelope idiom).
    pub zero_sustain_is_full: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            near_write_cycles: 16,
            guard_cycles: 96,
            zero_sustain_is_full: true,
        }
    }
}

/// One reduced, hashed sound fragment for a single voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Source voice, 1..=3.
    pub voice: u8,
    /// Absolute cycle of the gate-on that opened the fragment.
    pub clock_start: u64,
    /// Measured span until the next fragment began, when one did.
    pub clock_duration: Option<u64>,
    /// Inferred cycles per playroutine call.
    pub rate: Option<u64>,
    /// Playroutine calls per video frame, at least 1.
    pub pr_speed: u64,
    /// State-change rows, times rebased to the fragment start.
    pub rows: Vec<SsfRow>,
    pub hashid_noclock: u64,
    pub hashid_clock: u64,
    pub hashid: u64,
    /// Set once the canonicalizer has appended the explicit end row.
    pub padded: bool,
}

impl Fragment {
    /// Rows excluding the canonicalizer's padding row.
    pub fn content_rows(&self) -> &[SsfRow] {
        if self.padded {
            &self.rows[..self.rows.len() - 1]
        } else {
            &self.rows
        }
    }

    /// Clock offset of the fragment's last row.
    pub fn end_clock(&self) -> u64 {
        self.rows.last().map(|r| r.clock).unwrap_or(0)
    }
}

/// One trigger-log entry: a gate-on that produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Absolute cycle of the gate-on.
    pub clock: u64,
    /// Hash id of the produced fragment (canonical after remapping).
    pub hashid: u64,
    /// Voice, 1..=3.
    pub voice: u8,
}

/// Result of splitting one decoded state table.
#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    pub fragments: Vec<Fragment>,
    pub triggers: Vec<Trigger>,
}

/// Rotate one dense state row into the carrier/modulator view of `voice`
/// (0-based). Every field starts non-null; the reduction passes mask from
/// here.
fn rotate_row(row: &StateRow, voice: usize) -> SsfRow {
    let carrier = &row.state.voices[voice];
    let modulator = &row.state.voices[(voice + 2) % 3];
    let common = &row.state.common;
    SsfRow {
        clock: row.clock,
        vbi_frame: 0,
        pr_frame: 0,
        freq1: Some(carrier.freq),
        pwduty1: Some(carrier.pwduty),
        gate1: Some(carrier.gate),
        sync1: Some(carrier.sync),
        ring1: Some(carrier.ring),
        test1: Some(carrier.test),
        tri1: Some(carrier.tri),
        saw1: Some(carrier.saw),
        pulse1: Some(carrier.pulse),
        noise1: Some(carrier.noise),
        atk1: Some(carrier.atk),
        dec1: Some(carrier.dec),
        sus1: Some(carrier.sus),
        rel1: Some(carrier.rel),
        vol: Some(common.vol),
        flt1: Some(common.flt[voice]),
        fltlo: Some(common.fltlo),
        fltband: Some(common.fltband),
        flthi: Some(common.flthi),
        fltres: Some(common.fltres),
        fltcoff: Some(common.fltcoff),
        freq3: Some(modulator.freq),
        test3: Some(modulator.test),
    }
}

/// Rewrite near-writes: where a field changes twice within `window` cycles,
/// the earlier run takes the later value (the audible state in such a
/// window is dominated by the later write). Runs are processed from the
/// tail so chains of rapid writes collapse to the final value.
fn coalesce_field<T, G, S>(rows: &mut [SsfRow], window: u64, get: G, set: S)
where
    T: Copy + PartialEq,
    G: Fn(&SsfRow) -> T,
    S: Fn(&mut SsfRow, T),
{
    if rows.is_empty() {
        return;
    }
    // Change points: row 0 plus every row whose value differs from its
    // predecessor.
    let mut changes: Vec<usize> = vec![0];
    for i in 1..rows.len() {
        if get(&rows[i]) != get(&rows[i - 1]) {
            changes.push(i);
        }
    }
    for pair in (0..changes.len() - 1).rev() {
        let (i, j) = (changes[pair], changes[pair + 1]);
        if rows[j].clock - rows[i].clock <= window {
            let v = get(&rows[j]);
            for row in &mut rows[i..j] {
                set(row, v);
            }
        }
    }
}

/// Coalesce near-writes to the filter cutoff on the dense table, before any
/// voice is split.
fn coalesce_fltcoff(rows: &mut [StateRow], window: u64) {
    if rows.is_empty() {
        return;
    }
    let mut changes: Vec<usize> = vec![0];
    for i in 1..rows.len() {
        if rows[i].state.common.fltcoff != rows[i - 1].state.common.fltcoff {
            changes.push(i);
        }
    }
    for pair in (0..changes.len() - 1).rev() {
        let (i, j) = (changes[pair], changes[pair + 1]);
        if rows[j].clock - rows[i].clock <= window {
            let v = rows[j].state.common.fltcoff;
            for row in &mut rows[i..j] {
                row.state.common.fltcoff = v;
            }
        }
    }
}

/// Run the per-fragment reduction pipeline. Returns `None` when the
/// fragment reduces to nothing audible.
fn build_fragment(
    mut rows: Vec<SsfRow>,
    voice: u8,
    next_clock_start: u64,
    clock: ChipClock,
    opts: &SplitOptions,
) -> Option<Fragment> {
    reduce::collapse_adsr(&mut rows, opts.zero_sustain_is_full);
    reduce::mask_test_prefix(&mut rows);
    reduce::resolve_waveform_combinations(&mut rows);
    reduce::mask_modulator(&mut rows);
    reduce::mask_carrier_without_waveform(&mut rows);
    reduce::mask_filter_routing(&mut rows);
    reduce::mask_pulse_width(&mut rows);

    if !reduce::trim_trailing(&mut rows) {
        return None;
    }

    let clock_start = rows[0].clock;
    reduce::apply_guard_window(&mut rows, next_clock_start, opts.guard_cycles);
    if rows.is_empty() {
        return None;
    }
    let clock_duration = (next_clock_start > clock_start)
        .then(|| next_clock_start - clock_start - 1);

    let inferred = rate::infer_rate(&rows, clock);

    // Time indexing: frame numbers from absolute cycles, then rebase all
    // three time columns to the fragment start.
    let cycles_per_frame = clock.cycles_per_frame();
    for row in &mut rows {
        row.vbi_frame = row.clock / cycles_per_frame;
        row.pr_frame = match inferred.rate {
            Some(r) => row.clock / r,
            None => row.vbi_frame,
        };
    }
    let (vbi0, pr0) = (rows[0].vbi_frame, rows[0].pr_frame);
    for row in &mut rows {
        row.clock -= clock_start;
        row.vbi_frame -= vbi0;
        row.pr_frame -= pr0;
    }

    reduce::squeeze_diff(&mut rows);

    if !reduce::has_observable_change(&rows) || reduce::test_set_throughout(&rows) {
        return None;
    }

    assert_eq!(rows[0].gate1, Some(true), "fragment must open with gate on");
    assert_eq!(rows[0].clock, 0, "fragment rows must be rebased");

    let hashid_noclock = hash::hash_noclock(&rows);
    let hashid_clock = hash::hash_clock(&rows);
    let hashid = hash::combine(hashid_clock, hashid_noclock);

    Some(Fragment {
        voice,
        clock_start,
        clock_duration,
        rate: inferred.rate,
        pr_speed: inferred.pr_speed,
        rows,
        hashid_noclock,
        hashid_clock,
        hashid,
        padded: false,
    })
}

/// Split a decoded state table into per-voice sound fragments and the
/// trigger log of gate-ons that produced them.
pub fn split_voices(rows: &[StateRow], clock: ChipClock, opts: &SplitOptions) -> SplitOutput {
    let mut dense = rows.to_vec();
    coalesce_fltcoff(&mut dense, opts.near_write_cycles);

    let mut out = SplitOutput::default();
    let overall_max = dense.last().map(|r| r.clock).unwrap_or(0);

    for voice in 0..3usize {
        if !dense.iter().any(|r| r.state.voices[voice].gate) {
            continue;
        }

        let mut rotated: Vec<SsfRow> = dense.iter().map(|r| rotate_row(r, voice)).collect();

        coalesce_field(
            &mut rotated,
            opts.near_write_cycles,
            |r| r.freq1,
            |r, v| r.freq1 = v,
        );
        coalesce_field(
            &mut rotated,
            opts.near_write_cycles,
            |r| r.pwduty1,
            |r, v| r.pwduty1 = v,
        );
        coalesce_field(
            &mut rotated,
            opts.near_write_cycles,
            |r| r.freq3,
            |r, v| r.freq3 = v,
        );

        reduce::mask_filter_disengaged(&mut rotated);

        // Gate-on rising edges delimit fragments; rows before the first
        // edge are the implicit fragment 0 and fall away here.
        let mut edges: Vec<usize> = Vec::new();
        let mut prev_gate = false;
        for (i, row) in rotated.iter().enumerate() {
            let gate = row.gate1 == Some(true);
            if gate && !prev_gate {
                edges.push(i);
            }
            prev_gate = gate;
        }

        for (n, &start) in edges.iter().enumerate() {
            let end = edges.get(n + 1).copied().unwrap_or(rotated.len());
            let next_clock_start = edges
                .get(n + 1)
                .map(|&i| rotated[i].clock)
                .unwrap_or(overall_max);
            let slice = rotated[start..end].to_vec();
            if let Some(fragment) =
                build_fragment(slice, voice as u8 + 1, next_clock_start, clock, opts)
            {
                out.triggers.push(Trigger {
                    clock: fragment.clock_start,
                    hashid: fragment.hashid,
                    voice: fragment.voice,
                });
                out.fragments.push(fragment);
            }
        }
    }

    // Deterministic trigger order across voices.
    out.triggers.sort_by_key(|t| (t.clock, t.voice));
    out
}
