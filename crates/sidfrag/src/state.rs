//! Register decoding: sparse write stream to dense per-cycle chip state.
//!
//! The chip's registers are write-only and last-value-wins: a register holds
//! the most recent byte written to it and there is no "cleared" state. The
//! decoder reconstructs that state from the sparse write stream:
//!
//! 1. Compute absolute cycles by cumulative sum over the write deltas.
//! 2. Per register, drop adjacent writes with identical values (they change
//!    nothing observable).
//! 3. Re-merge the per-register streams in cycle order.
//! 4. Pivot to one row per cycle that saw any surviving write, with all 25
//!    registers forward-filled from zero-initialised state.
//! 5. Unpack each voice's 7-byte block and the common registers 21..=24
//!    into structured fields.
//!
//! The external-filter route bit (`fltext`) is forced to 0 during decode;
//! the external filter path is not deterministically emulable.

use crate::dump::RegisterWrite;

/// Number of registers covered by the decoder (0..=24).
pub const REGISTER_COUNT: usize = 25;

/// Decoded state of one voice at one cycle.
///
/// Field widths follow the register map: `freq` is the full 16-bit
/// oscillator increment, `pwduty` the 12-bit pulse width, the control
/// flags are the eight bits of the voice's control register and the ADSR
/// nibbles come from the attack/decay and sustain/release registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceState {
    pub freq: u16,
    pub pwduty: u16,
    pub gate: bool,
    pub sync: bool,
    pub ring: bool,
    pub test: bool,
    pub tri: bool,
    pub saw: bool,
    pub pulse: bool,
    pub noise: bool,
    pub atk: u8,
    pub dec: u8,
    pub sus: u8,
    pub rel: u8,
}

/// Decoded common (non-voice) state at one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommonState {
    /// Main volume, 4 bits.
    pub vol: u8,
    /// Per-voice filter routing, index 0 = voice 1.
    pub flt: [bool; 3],
    /// External-input filter route. Always decoded as 0.
    pub fltext: bool,
    /// Filter mode bits.
    pub fltlo: bool,
    pub fltband: bool,
    pub flthi: bool,
    /// Filter resonance, 4 bits.
    pub fltres: u8,
    /// Filter cutoff, 11 bits.
    pub fltcoff: u16,
    /// Voice-3 output disable.
    pub mute3: bool,
}

/// Full decoded chip state at one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SidState {
    pub voices: [VoiceState; 3],
    pub common: CommonState,
}

impl SidState {
    /// Unpack a 25-byte register image into structured state.
    fn decode(regs: &[u8; REGISTER_COUNT]) -> Self {
        let mut state = SidState::default();

        for (v, voice) in state.voices.iter_mut().enumerate() {
            let base = v * 7;
            voice.freq = u16::from(regs[base]) | (u16::from(regs[base + 1]) << 8);
            voice.pwduty = u16::from(regs[base + 2]) | (u16::from(regs[base + 3] & 0x0F) << 8);
            let control = regs[base + 4];
            voice.gate = control & 0x01 != 0;
            voice.sync = control & 0x02 != 0;
            voice.ring = control & 0x04 != 0;
            voice.test = control & 0x08 != 0;
            voice.tri = control & 0x10 != 0;
            voice.saw = control & 0x20 != 0;
            voice.pulse = control & 0x40 != 0;
            voice.noise = control & 0x80 != 0;
            voice.atk = regs[base + 5] >> 4;
            voice.dec = regs[base + 5] & 0x0F;
            voice.sus = regs[base + 6] >> 4;
            voice.rel = regs[base + 6] & 0x0F;
        }

        let common = &mut state.common;
        common.fltcoff = u16::from(regs[21] & 0x07) | (u16::from(regs[22]) << 3);
        common.flt = [
            regs[23] & 0x01 != 0,
            regs[23] & 0x02 != 0,
            regs[23] & 0x04 != 0,
        ];
        // fltext is forced to 0: the external-filter signal path is
        // nondeterministic and excluded from state reconstruction.
        common.fltext = false;
        common.fltres = regs[23] >> 4;
        common.vol = regs[24] & 0x0F;
        common.fltlo = regs[24] & 0x10 != 0;
        common.fltband = regs[24] & 0x20 != 0;
        common.flthi = regs[24] & 0x40 != 0;
        common.mute3 = regs[24] & 0x80 != 0;

        state
    }
}

/// One dense state row: the full chip state at a cycle that saw a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRow {
    pub clock: u64,
    pub state: SidState,
}

/// Decode a write stream into a dense, forward-filled state table.
///
/// The result has one row per cycle at which at least one state-changing
/// write landed; rows are in ascending cycle order. Writes to the same
/// register at the same cycle resolve to the last one in stream order.
///
/// The caller is expected to have validated register indices (the dump
/// parser rejects indices above 24); this function asserts on violation.
pub fn decode_writes(writes: &[RegisterWrite]) -> Vec<StateRow> {
    // Step 1: absolute cycles.
    let mut cycle = 0u64;
    let mut timed: Vec<(u64, u8, u8)> = Vec::with_capacity(writes.len());
    for w in writes {
        assert!(
            (w.register as usize) < REGISTER_COUNT,
            "register index {} out of decoder range",
            w.register
        );
        cycle += w.delta;
        timed.push((cycle, w.register, w.value));
    }

    // Step 2: per register, drop adjacent writes with identical values.
    // The stream order within a register is already cycle order.
    let mut last_value: [Option<u8>; REGISTER_COUNT] = [None; REGISTER_COUNT];
    let mut surviving: Vec<(u64, u8, u8)> = Vec::with_capacity(timed.len());
    for (clock, register, value) in timed {
        if last_value[register as usize] == Some(value) {
            continue;
        }
        last_value[register as usize] = Some(value);
        surviving.push((clock, register, value));
    }

    // Step 3: the surviving concatenation is still sorted by cycle because
    // step 2 preserved stream order; a stable re-sort keeps equal-cycle
    // writes in stream order.
    surviving.sort_by_key(|&(clock, _, _)| clock);

    // Steps 4-5: pivot with forward fill from zero-initialised registers,
    // emitting one decoded row per distinct cycle.
    let mut regs = [0u8; REGISTER_COUNT];
    let mut rows: Vec<StateRow> = Vec::new();
    let mut i = 0;
    while i < surviving.len() {
        let clock = surviving[i].0;
        while i < surviving.len() && surviving[i].0 == clock {
            regs[surviving[i].1 as usize] = surviving[i].2;
            i += 1;
        }
        rows.push(StateRow {
            clock,
            state: SidState::decode(&regs),
        });
    }
    rows
}
