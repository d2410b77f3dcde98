use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Result;
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use walkdir::WalkDir;

use sidfrag::FragmentCatalog;
use sidfrag::chip::ChipClock;
use sidfrag::sidfile::SidHeader;

use crate::catalog::{analyze_path, write_json};

/// True for files the corpus scanner treats as register dumps.
fn is_dump_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    match ext.to_ascii_lowercase().as_str() {
        "dump" | "log" => true,
        // foo.dump.gz / foo.log.gz
        "gz" => {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            stem.ends_with(".dump") || stem.ends_with(".log")
        }
        _ => false,
    }
}

/// Clock declared by a sibling `.sid` file (same stem as the dump), when
/// one exists and parses.
fn sibling_sid_clock(path: &Path) -> Option<ChipClock> {
    let mut base = path.with_extension("");
    if base
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("dump") || e.eq_ignore_ascii_case("log"))
    {
        base = base.with_extension("");
    }
    let sid = base.with_extension("sid");
    let bytes = std::fs::read(&sid).ok()?;
    let header = SidHeader::parse(&bytes).ok()?;
    debug!(
        "{}: header declares {:?}",
        sid.display(),
        header.chip_clock()
    );
    Some(header.chip_clock())
}

/// Collect dump files under `dir`, sorted for a stable scan order.
fn discover(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_dump_path(path))
        .collect();
    files.sort();
    files
}

/// Analyze every dump under `dir` with a bounded worker pool and merge the
/// per-file catalogs into one.
///
/// Workers share no mutable state: paths go out over one channel, finished
/// catalogs come back over another, and the merge happens only after every
/// worker has exited. Per-file failures are logged and skipped; the merge
/// itself is order-independent, so the result does not depend on worker
/// scheduling.
///
/// Each file's clock comes from `clock_override` when set, else from a
/// sibling `.sid` header, else PAL.
pub fn run(
    dir: &Path,
    out: Option<&Path>,
    jobs: Option<usize>,
    maxstates: Option<usize>,
    clock_override: Option<ChipClock>,
) -> Result<()> {
    let files = discover(dir);
    if files.is_empty() {
        println!("no dump files under {}", dir.display());
        return Ok(());
    }

    let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    let workers = jobs.unwrap_or_else(|| (available / 2).max(1)).max(1);
    info!("analyzing {} files with {} workers", files.len(), workers);

    let (path_tx, path_rx) = unbounded::<PathBuf>();
    let (result_tx, result_rx) = unbounded::<FragmentCatalog>();
    for path in &files {
        path_tx.send(path.clone()).expect("send on open channel");
    }
    drop(path_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let path_rx = path_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok(path) = path_rx.recv() {
                    let clock = clock_override
                        .or_else(|| sibling_sid_clock(&path))
                        .unwrap_or_default();
                    match analyze_path(&path, maxstates, clock) {
                        Ok(catalog) => {
                            result_tx.send(catalog).expect("send on open channel");
                        }
                        Err(err) => warn!("skipping {}: {:#}", path.display(), err),
                    }
                }
            });
        }
        drop(result_tx);
    });

    let catalogs: Vec<FragmentCatalog> = result_rx.into_iter().collect();
    let analyzed = catalogs.len();
    let merged = FragmentCatalog::merge(catalogs);

    println!(
        "{} of {} files analyzed: {} distinct fragments, {} triggers",
        analyzed,
        files.len(),
        merged.entries.len(),
        merged.triggers.len()
    );

    if let Some(path) = out {
        write_json(&merged, path)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
