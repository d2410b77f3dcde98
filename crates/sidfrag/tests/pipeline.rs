//! End-to-end pipeline scenarios: dump text in, catalog and notes out.

use sidfrag::canon::canonicalize;
use sidfrag::chip::ChipClock;
use sidfrag::dump::parse_dump;
use sidfrag::midi::{DrumKind, MidiTranscriber, TranscribedFragment};
use sidfrag::ssf::{SplitOptions, split_voices};
use sidfrag::state::decode_writes;
use sidfrag::{FragmentCatalog, analyze_dump};

fn analyze(text: &str) -> FragmentCatalog {
    analyze_dump(text, ChipClock::Pal, None, &SplitOptions::default()).unwrap()
}

#[test]
fn pure_triangle_note_pal() {
    // Volume 15, freq 4096, gate on with triangle, held ~100k cycles.
    let catalog = analyze("1 24 15\n1 0 0\n1 1 16\n1 4 17\n100000 4 16\n");
    assert_eq!(catalog.entries.len(), 1);
    assert_eq!(catalog.triggers.len(), 1);

    let fragment = &catalog.entries[0].fragment;
    assert_eq!(fragment.voice, 1);
    let first = &fragment.rows[0];
    assert_eq!(first.gate1, Some(true));
    assert_eq!(first.clock, 0);
    assert_eq!(first.freq1, Some(4096));
    assert_eq!(first.tri1, Some(true));
    assert_eq!(first.sus1, Some(15));

    // The last content row is the gate-off; the padding row repeats it at
    // the fragment's end.
    let content = fragment.content_rows();
    assert_eq!(content.last().unwrap().gate1, Some(false));
    assert!(fragment.padded);

    // 4096 * 985248 / 2^24 ≈ 240.6 Hz → B3 (MIDI 59), full sustain → 116.
    let transcriber = MidiTranscriber::new(ChipClock::Pal);
    match transcriber.transcribe(fragment, None) {
        TranscribedFragment::Notes(notes) => {
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].pitch, 59);
            assert_eq!(notes[0].velocity, 116);
        }
        other => panic!("expected pitched notes, got {:?}", other),
    }
}

#[test]
fn test_prefix_suppression() {
    // test+gate asserted for 5000 cycles, then triangle plays for 200k.
    let catalog = analyze("1 24 15\n1 1 16\n1 4 25\n5000 4 17\n200000 4 16\n");
    assert_eq!(catalog.entries.len(), 1);
    let fragment = &catalog.entries[0].fragment;

    // Rows inside the test prefix carry no oscillator state.
    let prefix: Vec<_> = fragment
        .rows
        .iter()
        .take_while(|r| r.test1 == Some(true))
        .collect();
    assert!(!prefix.is_empty());
    for row in &prefix {
        assert_eq!(row.freq1, None);
        assert_eq!(row.tri1, None);
    }

    // The first audible row starts after the prefix.
    let audible = fragment.rows.iter().find(|r| r.freq1.is_some()).unwrap();
    assert!(audible.clock > 0);
}

#[test]
fn noise_combined_silence() {
    // pulse+noise together: the chip outputs silence, the only row loses
    // all waveform bits and the fragment is discarded.
    let catalog = analyze("1 24 15\n1 1 16\n1 4 193\n50000 4 192\n");
    assert!(catalog.is_empty());
    assert!(catalog.triggers.is_empty());
}

#[test]
fn rate_inference_single_and_double_speed() {
    let mut single = String::from("1 24 15\n1 1 16\n1 4 17\n");
    for i in 0..8 {
        single.push_str(&format!("19656 1 {}\n", if i % 2 == 0 { 18 } else { 16 }));
    }
    single.push_str("19656 4 16\n");
    let catalog = analyze(&single);
    let fragment = &catalog.entries[0].fragment;
    assert_eq!(fragment.rate, Some(19_656));
    assert_eq!(fragment.pr_speed, 1);

    let mut double = String::from("1 24 15\n1 1 16\n1 4 17\n");
    for i in 0..8 {
        double.push_str(&format!("9828 1 {}\n", if i % 2 == 0 { 18 } else { 16 }));
    }
    double.push_str("9828 4 16\n");
    let catalog = analyze(&double);
    let fragment = &catalog.entries[0].fragment;
    assert_eq!(fragment.rate, Some(9_828));
    assert_eq!(fragment.pr_speed, 2);
}

#[test]
fn fuzzy_match_canonicalization() {
    // Two renditions of the same patch with up to 64 cycles of timing
    // drift: clock columns [0, 19346, 19636, 39225] vs
    // [0, 19410, 19700, 39289].
    let text = "1 24 15\n\
                98 1 16\n\
                1 4 17\n\
                19346 1 18\n\
                290 1 20\n\
                19589 4 16\n\
                5675 1 16\n\
                0 4 17\n\
                19410 1 18\n\
                290 1 20\n\
                19589 4 16\n";
    let rows = decode_writes(&parse_dump(text, None).unwrap());
    let split = split_voices(&rows, ChipClock::Pal, &SplitOptions::default());
    assert_eq!(split.fragments.len(), 2);
    assert_eq!(
        split.fragments[0].hashid_noclock,
        split.fragments[1].hashid_noclock
    );
    assert_ne!(
        split.fragments[0].hashid_clock,
        split.fragments[1].hashid_clock
    );
    assert_eq!(
        split.fragments[0].rows.iter().map(|r| r.clock).collect::<Vec<_>>(),
        vec![0, 19_346, 19_636, 39_225]
    );
    assert_eq!(
        split.fragments[1].rows.iter().map(|r| r.clock).collect::<Vec<_>>(),
        vec![0, 19_410, 19_700, 39_289]
    );

    let catalog = analyze(text);
    assert_eq!(catalog.entries.len(), 1);
    assert_eq!(catalog.entries[0].count, 2);
    let canonical = catalog.entries[0].fragment.hashid;
    assert!(catalog.triggers.iter().all(|t| t.hashid == canonical));
}

#[test]
fn percussion_classification() {
    // Pure noise for 30000 cycles: a cymbal-class drum, not a pitched
    // note.
    let catalog = analyze("1 24 15\n1 1 8\n1 4 129\n30000 4 128\n");
    assert_eq!(catalog.entries.len(), 1);
    let fragment = &catalog.entries[0].fragment;
    let transcriber = MidiTranscriber::new(ChipClock::Pal);
    match transcriber.transcribe(fragment, None) {
        TranscribedFragment::Drum { kind, velocity, .. } => {
            assert_eq!(kind, DrumKind::PedalHiHat);
            assert!(velocity >= 32);
        }
        other => panic!("expected a drum, got {:?}", other),
    }
}

#[test]
fn empty_input_is_empty_catalog() {
    let catalog = analyze("");
    assert!(catalog.is_empty());
    assert!(catalog.triggers.is_empty());
}

#[test]
fn gate_without_waveform_yields_nothing() {
    let catalog = analyze("1 24 15\n1 1 16\n1 4 1\n50000 4 0\n");
    assert!(catalog.is_empty());
}

#[test]
fn test_asserted_throughout_is_dropped() {
    let catalog = analyze("1 24 15\n1 1 16\n1 4 25\n50000 4 24\n");
    assert!(catalog.is_empty());
}

#[test]
fn ring_without_tri_keeps_no_modulator_state() {
    // Sawtooth with ring: ring clears, so no modulator state survives.
    let catalog = analyze("1 24 15\n1 14 100\n1 1 16\n1 4 37\n50000 4 36\n");
    assert_eq!(catalog.entries.len(), 1);
    for row in catalog.entries[0].fragment.content_rows() {
        assert_eq!(row.ring1, None);
        assert_eq!(row.freq3, None);
        assert_eq!(row.test3, None);
    }
}

#[test]
fn universal_invariants_hold() {
    // A three-voice dump with retriggers, vibrato and a filter sweep.
    let mut text = String::from("1 24 15\n1 23 65\n1 22 128\n");
    // Voice 1: two triangle notes with vibrato.
    text.push_str("1 1 16\n1 4 17\n");
    for i in 0..4 {
        text.push_str(&format!("19656 1 {}\n", if i % 2 == 0 { 17 } else { 16 }));
    }
    text.push_str("100 4 16\n1000 4 17\n30000 4 16\n");
    // Voice 2: pulse note.
    text.push_str("100 9 8\n0 10 8\n0 8 32\n0 11 65\n40000 11 64\n");
    // Voice 3: noise hit.
    text.push_str("100 15 16\n0 18 129\n5000 18 128\n");

    let rows = decode_writes(&parse_dump(&text, None).unwrap());
    let split = split_voices(&rows, ChipClock::Pal, &SplitOptions::default());
    assert!(!split.fragments.is_empty());

    for fragment in &split.fragments {
        // Invariant 1: gate on at a rebased origin.
        assert_eq!(fragment.rows[0].gate1, Some(true));
        assert_eq!(fragment.rows[0].clock, 0);

        // Invariant 2: every row carries some observable state.
        for row in &fragment.rows {
            assert!(row.freq1.is_some() || row.vol.is_some() || row.gate1.is_some());
        }

        // Invariant 3: squeeze-diff normal form.
        for pair in fragment.rows.windows(2) {
            assert!(!pair[0].visible_eq(&pair[1]));
        }

        // Invariant 4: pr_speed is consistent with the inferred rate.
        if let Some(rate) = fragment.rate {
            let cpf = ChipClock::Pal.cycles_per_frame() as f64;
            let expect = ((cpf / rate as f64).round() as u64).max(1);
            assert_eq!(fragment.pr_speed, expect);
        }
    }

    // Invariant 6: canonicalization is idempotent.
    let first = canonicalize(split.fragments.clone(), ChipClock::Pal);
    let again = canonicalize(first.fragments.clone(), ChipClock::Pal);
    assert_eq!(first.fragments, again.fragments);

    // Triggers are one per surviving fragment, in clock order.
    assert_eq!(split.triggers.len(), split.fragments.len());
    for pair in split.triggers.windows(2) {
        assert!(pair[0].clock <= pair[1].clock);
    }
}
