use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use sidfrag::render::{EmulatorDriver, TestSid, write_wav_thumbnail};

use crate::AnalyzeArgs;
use crate::catalog::analyze_file;

/// Render every canonical fragment to a WAV thumbnail named by hash id.
pub fn run(args: &AnalyzeArgs, outdir: &Path) -> Result<()> {
    let catalog = analyze_file(args)?;
    fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create {}", outdir.display()))?;

    let mut driver = EmulatorDriver::new(TestSid::new(args.clock()));
    let mut written = 0usize;
    for entry in &catalog.entries {
        let samples = driver.render(&entry.fragment);
        if samples.is_empty() {
            continue;
        }
        let path = write_wav_thumbnail(
            outdir,
            entry.fragment.hashid,
            &samples,
            driver.sample_rate(),
        )
        .with_context(|| format!("failed to write thumbnail for {:016x}", entry.fragment.hashid))?;
        info!("wrote {}", path.display());
        written += 1;
    }
    println!(
        "rendered {} of {} fragments into {}",
        written,
        catalog.entries.len(),
        outdir.display()
    );
    Ok(())
}
