use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use sidfrag::FragmentCatalog;
use sidfrag::chip::ChipClock;
use sidfrag::midi::{FreqBand, MidiTranscriber, TranscribedFragment, derive_bpm};
use sidfrag::render::{EmulatorDriver, TestSid, loudest_band};

use crate::AnalyzeArgs;
use crate::catalog::analyze_file;

/// Ticks per quarter-note in the written file.
const PPQ: u16 = 480;
/// General MIDI percussion channel (0-based).
const DRUM_CHANNEL: u8 = 9;

/// One event at an absolute tick; `order` breaks ties so note-offs land
/// before simultaneous note-ons.
struct AbsoluteEvent {
    tick: u64,
    order: u8,
    kind: TrackEventKind<'static>,
}

pub fn run(args: &AnalyzeArgs, out: &Path, bpm_override: Option<f64>) -> Result<()> {
    let clock = args.clock();
    let catalog = analyze_file(args)?;

    let bpm = bpm_override.unwrap_or_else(|| catalog_bpm(&catalog, clock));
    let transcriber = match bpm_override {
        Some(bpm) => MidiTranscriber::new(clock).with_bpm(bpm),
        None => MidiTranscriber::new(clock),
    };

    // Band readout per distinct fragment, for the percussion classifier.
    let mut driver = EmulatorDriver::new(TestSid::new(clock));
    let bands: HashMap<u64, Option<FreqBand>> = catalog
        .entries
        .iter()
        .map(|e| {
            let samples = driver.render(&e.fragment);
            (e.fragment.hashid, loudest_band(&samples, driver.sample_rate()))
        })
        .collect();

    // Track 0 carries tempo; tracks 1..=3 one voice each; track 4 drums.
    let mut tracks: [Vec<AbsoluteEvent>; 5] = Default::default();
    tracks[0].push(AbsoluteEvent {
        tick: 0,
        order: 0,
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
            (60_000_000.0 / bpm).round() as u32,
        ))),
    });

    let cycles_to_ticks = |cycles: u64| -> u64 {
        let seconds = cycles as f64 / clock.phi2_hz() as f64;
        (seconds * bpm / 60.0 * PPQ as f64).round() as u64
    };

    let mut notes_emitted = 0usize;
    let mut drums_emitted = 0usize;
    for trigger in &catalog.triggers {
        let Some(entry) = catalog.get(trigger.hashid) else {
            continue;
        };
        let band = bands.get(&trigger.hashid).copied().flatten();
        let base = trigger.clock;
        match transcriber.transcribe(&entry.fragment, band) {
            TranscribedFragment::Notes(notes) => {
                let track = &mut tracks[trigger.voice as usize];
                let channel = u4::new(trigger.voice - 1);
                for note in notes {
                    push_note(
                        track,
                        channel,
                        note.pitch,
                        note.velocity,
                        cycles_to_ticks(base + note.start_clock),
                        cycles_to_ticks(base + note.end_clock),
                    );
                    notes_emitted += 1;
                }
            }
            TranscribedFragment::Drum {
                kind,
                velocity,
                duration,
            } => {
                push_note(
                    &mut tracks[4],
                    u4::new(DRUM_CHANNEL),
                    kind.gm_note(),
                    velocity,
                    cycles_to_ticks(base),
                    cycles_to_ticks(base + duration),
                );
                drums_emitted += 1;
            }
        }
    }
    info!(
        "transcribed {} notes and {} drum hits at {:.1} BPM",
        notes_emitted, drums_emitted, bpm
    );

    let smf_tracks: Vec<Vec<TrackEvent>> = tracks.into_iter().map(finalize_track).collect();
    let smf = Smf {
        header: Header::new(Format::Parallel, Timing::Metrical(u15::new(PPQ))),
        tracks: smf_tracks,
    };
    smf.save(out)
        .with_context(|| format!("failed to write midi file {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

/// Tempo for the whole file: the most frequently triggered fragment rate.
fn catalog_bpm(catalog: &FragmentCatalog, clock: ChipClock) -> f64 {
    let mut weights: HashMap<u64, u64> = HashMap::new();
    for entry in &catalog.entries {
        if let Some(rate) = entry.fragment.rate {
            *weights.entry(rate).or_insert(0) += entry.count;
        }
    }
    let rate = weights
        .into_iter()
        .max_by_key(|&(rate, weight)| (weight, std::cmp::Reverse(rate)))
        .map(|(rate, _)| rate);
    derive_bpm(rate, clock)
}

fn push_note(
    track: &mut Vec<AbsoluteEvent>,
    channel: u4,
    key: u8,
    velocity: u8,
    start_tick: u64,
    end_tick: u64,
) {
    let end_tick = end_tick.max(start_tick + 1);
    track.push(AbsoluteEvent {
        tick: start_tick,
        order: 1,
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(velocity),
            },
        },
    });
    track.push(AbsoluteEvent {
        tick: end_tick,
        order: 0,
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        },
    });
}

/// Sort by (tick, order), convert to delta times and close the track.
fn finalize_track(mut events: Vec<AbsoluteEvent>) -> Vec<TrackEvent<'static>> {
    events.sort_by_key(|e| (e.tick, e.order));
    let mut out = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u64;
    for event in events {
        let delta = event.tick - last_tick;
        last_tick = event.tick;
        out.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: event.kind,
        });
    }
    out.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    out
}
