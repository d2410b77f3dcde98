use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};
use log::info;

use sidfrag::FragmentCatalog;
use sidfrag::chip::ChipClock;
use sidfrag::dump::read_dump_file;
use sidfrag::midi::{MidiTranscriber, TranscribedFragment};
use sidfrag::ssf::SplitOptions;
use sidfrag::{canon, ssf, state};

use crate::AnalyzeArgs;
use crate::table::{pad_to_width, waveform_mask};

/// Read, decode and analyze one dump file into a catalog.
pub fn analyze_file(args: &AnalyzeArgs) -> Result<FragmentCatalog> {
    analyze_path(&args.logfile, args.maxstates, args.clock())
}

/// Shared analysis entry used by the corpus driver as well.
pub fn analyze_path(
    path: &Path,
    maxstates: Option<usize>,
    clock: ChipClock,
) -> Result<FragmentCatalog> {
    let writes = read_dump_file(path, maxstates)
        .with_context(|| format!("failed to read dump {}", path.display()))?;
    let rows = state::decode_writes(&writes);
    let split = ssf::split_voices(&rows, clock, &SplitOptions::default());
    info!(
        "{}: {} writes, {} fragments, {} triggers",
        path.display(),
        writes.len(),
        split.fragments.len(),
        split.triggers.len()
    );
    let canonical = canon::canonicalize(split.fragments, clock);
    Ok(FragmentCatalog::build(canonical, split.triggers))
}

/// Persist a catalog as JSON.
pub fn write_json(catalog: &FragmentCatalog, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(catalog).context("failed to serialize catalog")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Print a top-N summary of the catalog and optionally persist it.
pub fn run(args: &AnalyzeArgs, out: Option<&Path>, top: usize) -> Result<()> {
    let clock = args.clock();
    let catalog = analyze_file(args)?;

    let summary = [
        ("file", args.logfile.display().to_string()),
        ("clock", format!("{:?}", clock)),
        ("fragments", catalog.entries.len().to_string()),
        ("triggers", catalog.triggers.len().to_string()),
    ];
    for (key, value) in &summary {
        println!("{} {}", pad_to_width(key, 12), value);
    }

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "hashid", "count", "voice", "wave", "frames", "speed", "pitch",
        ]);

    let transcriber = MidiTranscriber::new(clock);
    for entry in catalog.entries.iter().take(top) {
        let fragment = &entry.fragment;
        let first = &fragment.rows[0];
        let wave = waveform_mask(
            first.tri1 == Some(true),
            first.saw1 == Some(true),
            first.pulse1 == Some(true),
            first.noise1 == Some(true),
        );
        let frames = fragment.end_clock() / clock.cycles_per_frame();
        let pitch = match transcriber.transcribe(fragment, None) {
            TranscribedFragment::Notes(notes) => notes
                .first()
                .map(|n| format!("{}", n.pitch))
                .unwrap_or_else(|| "-".into()),
            TranscribedFragment::Drum { kind, .. } => format!("{:?}", kind),
        };
        table.add_row(vec![
            Cell::new(format!("{:016x}", fragment.hashid)),
            Cell::new(entry.count),
            Cell::new(fragment.voice),
            Cell::new(wave),
            Cell::new(frames),
            Cell::new(fragment.pr_speed),
            Cell::new(pitch),
        ]);
    }
    println!("{table}");

    if let Some(path) = out {
        write_json(&catalog, path)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
