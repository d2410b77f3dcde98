use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use sidfrag::chip::ChipClock;

mod catalog;
mod corpus;
mod info;
mod midi;
mod table;
mod wav;

/// sidfrag command line tools
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every dump-analyzing subcommand.
#[derive(Args)]
struct AnalyzeArgs {
    /// Register dump to analyze (.gz accepted)
    #[arg(value_name = "LOGFILE")]
    logfile: PathBuf,

    /// Cap the number of register writes decoded
    #[arg(long = "maxstates")]
    maxstates: Option<usize>,

    /// Use PAL clock constants (the default)
    #[arg(long = "pal", conflicts_with = "ntsc")]
    pal: bool,

    /// Use NTSC clock constants
    #[arg(long = "ntsc")]
    ntsc: bool,
}

impl AnalyzeArgs {
    fn clock(&self) -> ChipClock {
        match (self.pal, self.ntsc) {
            (_, true) => ChipClock::Ntsc,
            _ => ChipClock::Pal,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a dump and show/store the fragment catalog
    Catalog {
        #[command(flatten)]
        analyze: AnalyzeArgs,
        /// Write the catalog (with trigger log) as JSON
        #[arg(long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
        /// Number of fragments to show in the summary table
        #[arg(long = "top", default_value_t = 20)]
        top: usize,
    },
    /// Transcribe a dump to a standard MIDI file
    Midi {
        #[command(flatten)]
        analyze: AnalyzeArgs,
        /// Output .mid path
        #[arg(long = "out", value_name = "FILE")]
        out: PathBuf,
        /// Override the tempo derived from the inferred play rate
        #[arg(long = "bpm")]
        bpm: Option<f64>,
    },
    /// Render per-fragment WAV thumbnails keyed by hash id
    Wav {
        #[command(flatten)]
        analyze: AnalyzeArgs,
        /// Directory to write thumbnails into
        #[arg(long = "outdir", value_name = "DIR")]
        outdir: PathBuf,
    },
    /// Show the PSID/RSID header of a .sid file
    Info {
        /// Input .sid file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Analyze every dump under a directory into one merged catalog
    Corpus {
        /// Directory to scan for .dump/.log files (.gz accepted)
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        /// Write the merged catalog as JSON
        #[arg(long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
        /// Worker count (default: half the available CPUs)
        #[arg(long = "jobs")]
        jobs: Option<usize>,
        /// Cap the number of register writes decoded per file
        #[arg(long = "maxstates")]
        maxstates: Option<usize>,
        /// Use NTSC clock constants for every file
        #[arg(long = "ntsc")]
        ntsc: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { analyze, out, top } => {
            catalog::run(&analyze, out.as_deref(), top)?;
        }
        Commands::Midi { analyze, out, bpm } => {
            midi::run(&analyze, &out, bpm)?;
        }
        Commands::Wav { analyze, outdir } => {
            wav::run(&analyze, &outdir)?;
        }
        Commands::Info { file } => {
            info::run(&file)?;
        }
        Commands::Corpus {
            dir,
            out,
            jobs,
            maxstates,
            ntsc,
        } => {
            let clock_override = ntsc.then_some(ChipClock::Ntsc);
            corpus::run(&dir, out.as_deref(), jobs, maxstates, clock_override)?;
        }
    }

    Ok(())
}
