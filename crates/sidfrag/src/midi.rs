//! MIDI transcription: fragments to pitched notes or drum hits.
//!
//! Pitch is the nearest equal-tempered note (A4 = 440 Hz) by absolute Hz
//! distance from the oscillator frequency. Velocity models the chip's ADSR
//! envelope: the note's loudness is the envelope level sampled midway
//! through its gated span (a note struck and held reads as its sustain
//! level; the sampling point is the one detail the envelope table leaves
//! open). Short noise-driven fragments classify as percussion instead of
//! pitched notes.

use serde::{Deserialize, Serialize};

use crate::chip::ChipClock;
use crate::ssf::Fragment;

/// Lowest companded velocity; quiet notes stay audible.
const VELOCITY_FLOOR: u8 = 32;
/// Highest companded velocity.
const VELOCITY_CEIL: u8 = 116;

/// One transcribed pitched note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number, 0..=127.
    pub pitch: u8,
    /// Companded velocity, `VELOCITY_FLOOR..=VELOCITY_CEIL`.
    pub velocity: u8,
    /// Onset, cycles from fragment start.
    pub start_clock: u64,
    /// End, cycles from fragment start.
    pub end_clock: u64,
}

/// General MIDI drum assignment for a percussive fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrumKind {
    PedalHiHat,
    ClosedHiHat,
    OpenHiHat,
    AcousticSnare,
    ElectricSnare,
    BassDrum,
    LowTom,
    HighTom,
}

impl DrumKind {
    /// General MIDI percussion key (channel 10 note number).
    pub fn gm_note(self) -> u8 {
        match self {
            DrumKind::PedalHiHat => 44,
            DrumKind::ClosedHiHat => 42,
            DrumKind::OpenHiHat => 46,
            DrumKind::AcousticSnare => 38,
            DrumKind::ElectricSnare => 40,
            DrumKind::BassDrum => 36,
            DrumKind::LowTom => 45,
            DrumKind::HighTom => 50,
        }
    }
}

/// Coarse spectral location of a rendered fragment, used to pick a
/// membrane drum. Produced by the renderer's band readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqBand {
    Low,
    Mid,
    High,
}

/// Transcription result for one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscribedFragment {
    /// Pitched material: ordered note events.
    Notes(Vec<NoteEvent>),
    /// Percussive material: a single drum hit at the fragment start.
    Drum {
        kind: DrumKind,
        velocity: u8,
        duration: u64,
    },
}

/// Nearest MIDI note by absolute Hz distance against the equal-tempered
/// table from A4 = 440 Hz. `None` for non-positive frequencies.
pub fn nearest_midi_pitch(hz: f64) -> Option<u8> {
    if !(hz > 0.0) {
        return None;
    }
    let mut best: Option<(u8, f64)> = None;
    for midi in 0u8..=127 {
        let note_hz = 440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0);
        let dist = (note_hz - hz).abs();
        if best.is_none_or(|(_, d)| dist < d) {
            best = Some((midi, dist));
        }
    }
    best.map(|(midi, _)| midi)
}

/// Envelope parameters of one fragment, taken from the gate-on and
/// gate-off rows.
#[derive(Debug, Clone, Copy, Default)]
struct Envelope {
    atk: u8,
    dec: u8,
    sus: u8,
    rel: u8,
    /// Cycle of the gate-off row, when the gate drops inside the fragment.
    gate_off: Option<u64>,
}

impl Envelope {
    fn from_fragment(fragment: &Fragment) -> Self {
        let first = fragment.rows.first();
        let gate_off_row = fragment
            .rows
            .iter()
            .find(|r| r.gate1 == Some(false));
        Self {
            atk: first.and_then(|r| r.atk1).unwrap_or(0),
            dec: first.and_then(|r| r.dec1).unwrap_or(0),
            sus: first.and_then(|r| r.sus1).unwrap_or(0),
            rel: gate_off_row.and_then(|r| r.rel1).unwrap_or(0),
            gate_off: gate_off_row.map(|r| r.clock),
        }
    }

    /// Envelope level (0..=127) at `cycle` within the fragment.
    fn level_at(&self, cycle: u64, clock: ChipClock) -> u8 {
        let sus_level = self.sus as f64 * 127.0 / 15.0;
        let gated = self.gate_off.is_none_or(|off| cycle < off);
        let level = if gated {
            let attack_end = clock.attack_cycles(self.atk);
            let decay_end = attack_end + clock.decay_release_cycles(self.dec);
            if cycle < attack_end {
                127.0 * cycle as f64 / attack_end as f64
            } else if cycle < decay_end {
                let decay_cycles = (decay_end - attack_end) as f64;
                127.0 - (127.0 - sus_level) * (cycle - attack_end) as f64 / decay_cycles
            } else {
                sus_level
            }
        } else {
            let off = self.gate_off.unwrap_or(0);
            let release_cycles = clock.decay_release_cycles(self.rel);
            let release_end = off + release_cycles;
            if cycle < release_end {
                sus_level * (1.0 - (cycle - off) as f64 / release_cycles as f64)
            } else {
                0.0
            }
        };
        level.round().clamp(0.0, 127.0) as u8
    }

    /// Companded velocity for a note spanning `start..end`: the envelope
    /// sampled midway through the gated part of the span.
    fn note_velocity(&self, start: u64, end: u64, clock: ChipClock) -> u8 {
        let gated_end = self.gate_off.map(|off| off.clamp(start, end)).unwrap_or(end);
        let sample = if gated_end > start {
            start + (gated_end - start) / 2
        } else {
            start
        };
        compand(self.level_at(sample, clock))
    }
}

/// Compand a 0..=127 envelope level into the audible MIDI velocity range.
fn compand(velocity: u8) -> u8 {
    let span = (VELOCITY_CEIL - VELOCITY_FLOOR) as f64;
    (velocity as f64 / 127.0 * span).round() as u8 + VELOCITY_FLOOR
}

/// Derive tempo from the playroutine call frequency, treating 24 calls as
/// one quarter-note. A null rate falls back to one call per video frame.
pub fn derive_bpm(rate: Option<u64>, clock: ChipClock) -> f64 {
    let period = rate.unwrap_or(clock.cycles_per_frame());
    let call_hz = clock.phi2_hz() as f64 / period as f64;
    call_hz * 60.0 / 24.0
}

/// Fragment-to-MIDI transcriber for one chip clock, with an optional tempo
/// override.
#[derive(Debug, Clone, Copy)]
pub struct MidiTranscriber {
    clock: ChipClock,
    bpm_override: Option<f64>,
}

impl MidiTranscriber {
    pub fn new(clock: ChipClock) -> Self {
        Self {
            clock,
            bpm_override: None,
        }
    }

    /// Force a tempo instead of deriving it from the inferred play rate.
    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm_override = Some(bpm);
        self
    }

    /// Tempo used for this fragment.
    pub fn bpm(&self, fragment: &Fragment) -> f64 {
        self.bpm_override
            .unwrap_or_else(|| derive_bpm(fragment.rate, self.clock))
    }

    /// Transcribe one fragment. `band` is the renderer's loudest-band
    /// readout when available; without it membrane drums are picked by
    /// duration alone.
    pub fn transcribe(
        &self,
        fragment: &Fragment,
        band: Option<FreqBand>,
    ) -> TranscribedFragment {
        let envelope = Envelope::from_fragment(fragment);
        if let Some(kind) = self.classify_percussion(fragment, band) {
            let duration = fragment.end_clock();
            let velocity = envelope.note_velocity(0, duration, self.clock);
            return TranscribedFragment::Drum {
                kind,
                velocity,
                duration,
            };
        }
        TranscribedFragment::Notes(self.transcribe_notes(fragment, &envelope))
    }

    /// Walk fragment rows emitting an onset whenever the nearest pitch
    /// changes while the oscillator is audible. The fragment's terminating
    /// row closes the last note.
    fn transcribe_notes(&self, fragment: &Fragment, envelope: &Envelope) -> Vec<NoteEvent> {
        let mut notes = Vec::new();
        let mut open: Option<(u8, u64)> = None;
        let mut last_pitch: Option<u8> = None;

        for row in &fragment.rows {
            if row.test1 == Some(true) || !row.any_waveform() {
                continue;
            }
            let Some(freq) = row.freq1 else {
                continue;
            };
            let Some(pitch) = nearest_midi_pitch(self.clock.freq_to_hz(freq)) else {
                continue;
            };
            if last_pitch == Some(pitch) {
                continue;
            }
            if let Some((prev_pitch, start)) = open.take() {
                notes.push(NoteEvent {
                    pitch: prev_pitch,
                    velocity: envelope.note_velocity(start, row.clock, self.clock),
                    start_clock: start,
                    end_clock: row.clock,
                });
            }
            open = Some((pitch, row.clock));
            last_pitch = Some(pitch);
        }

        if let Some((pitch, start)) = open {
            let end = fragment.end_clock().max(start + 1);
            notes.push(NoteEvent {
                pitch,
                velocity: envelope.note_velocity(start, end, self.clock),
                start_clock: start,
                end_clock: end,
            });
        }
        notes
    }

    /// Percussion heuristic.
    ///
    /// A fragment qualifies when it fits inside a half-note and is either
    /// pure noise (cymbal/hi-hat class, picked by duration bands) or a
    /// single-noise-phase / pitch-drop hit (membrane class, picked by the
    /// loudest-band readout when available).
    fn classify_percussion(
        &self,
        fragment: &Fragment,
        band: Option<FreqBand>,
    ) -> Option<DrumKind> {
        let duration = fragment.end_clock();
        if duration == 0 {
            return None;
        }
        let bpm = self.bpm(fragment);
        let quarter_cycles = (60.0 / bpm * self.clock.phi2_hz() as f64) as u64;
        if duration > quarter_cycles * 2 {
            return None;
        }

        let wave_rows: Vec<_> = fragment
            .content_rows()
            .iter()
            .filter(|r| r.any_waveform())
            .collect();
        if wave_rows.is_empty() {
            return None;
        }

        let pure_noise = wave_rows.iter().all(|r| {
            r.noise1 == Some(true)
                && r.tri1 != Some(true)
                && r.saw1 != Some(true)
                && r.pulse1 != Some(true)
        });
        if pure_noise {
            return Some(self.cymbal_by_duration(duration));
        }

        // Membrane hits: at most one contiguous noise phase, short, and
        // either noisy or opening with a dive of two octaves or more.
        let noise_phases = count_noise_phases(fragment);
        if noise_phases <= 1 && duration <= quarter_cycles {
            let has_noise = noise_phases == 1;
            if has_noise || has_initial_pitch_drop(fragment) {
                return Some(self.membrane_drum(duration, band));
            }
        }
        None
    }

    /// Cymbal/hi-hat selection: each halving of the video frame moves one
    /// step down the list.
    fn cymbal_by_duration(&self, duration: u64) -> DrumKind {
        const CYMBALS: [DrumKind; 5] = [
            DrumKind::PedalHiHat,
            DrumKind::ClosedHiHat,
            DrumKind::OpenHiHat,
            DrumKind::AcousticSnare,
            DrumKind::ElectricSnare,
        ];
        let mut threshold = self.clock.cycles_per_frame();
        let mut idx = 0;
        while idx < CYMBALS.len() - 1 && duration < threshold {
            threshold /= 2;
            idx += 1;
        }
        CYMBALS[idx]
    }

    fn membrane_drum(&self, duration: u64, band: Option<FreqBand>) -> DrumKind {
        match band {
            Some(FreqBand::Low) => DrumKind::BassDrum,
            Some(FreqBand::Mid) => DrumKind::LowTom,
            Some(FreqBand::High) => DrumKind::HighTom,
            // Coarser duration-only fallback.
            None => {
                let frame = self.clock.cycles_per_frame();
                if duration >= frame {
                    DrumKind::BassDrum
                } else if duration >= frame / 2 {
                    DrumKind::LowTom
                } else {
                    DrumKind::HighTom
                }
            }
        }
    }
}

/// Number of contiguous runs of noise-waveform rows.
fn count_noise_phases(fragment: &Fragment) -> usize {
    let mut phases = 0;
    let mut in_noise = false;
    for row in fragment.content_rows() {
        let noisy = row.noise1 == Some(true);
        if noisy && !in_noise {
            phases += 1;
        }
        in_noise = noisy;
    }
    phases
}

/// True when the oscillator frequency dives at least two octaves from its
/// opening value.
fn has_initial_pitch_drop(fragment: &Fragment) -> bool {
    let mut freqs = fragment.content_rows().iter().filter_map(|r| r.freq1);
    let Some(first) = freqs.find(|&f| f > 0) else {
        return false;
    };
    fragment
        .content_rows()
        .iter()
        .filter_map(|r| r.freq1)
        .any(|f| f > 0 && f <= first / 4)
}
