//! sidfrag — analyzer for SID register-write logs.
//!
//! `sidfrag` reconstructs the discrete instrument patches a C64 music
//! routine played, starting from nothing but a timestamped register-write
//! log. The pipeline:
//!
//! 1. [`dump`] parses the `<delta> <register> <value>` log.
//! 2. [`state`] rebuilds dense per-cycle chip state from the sparse writes
//!    (the chip's registers are write-only and last-value-wins).
//! 3. [`ssf`] rotates each voice into a carrier/modulator view, masks
//!    inaudible state, slices the stream into gate-on-delimited *sound
//!    fragments*, infers the playroutine call rate and hashes each
//!    fragment deterministically.
//! 4. [`canon`] collapses fragments that differ only by cycle-level timing
//!    jitter and pads each canonical fragment to its measured duration.
//! 5. [`catalog`] holds the deduplicated fragment table and the trigger
//!    log of which fragment fired on which voice at which cycle.
//!
//! Downstream consumers read the catalog: [`midi`] transcribes fragments
//! into pitched notes or drum hits with envelope-derived velocity,
//! [`resample`] re-grids fragment rows onto playroutine frames, and
//! [`render`] plays fragments through an external emulator for WAV
//! thumbnails.
//!
//! Everything is deterministic: the same input bytes and configuration
//! produce a bit-identical catalog, hash ids included.
//!
//! # Examples
//!
//! ```rust
//! use sidfrag::chip::ChipClock;
//! use sidfrag::ssf::SplitOptions;
//!
//! // A single triangle note: volume, frequency, gate on, gate off.
//! let dump = "1 24 15\n1 0 0\n1 1 16\n1 4 17\n100000 4 16\n";
//! let catalog = sidfrag::analyze_dump(
//!     dump,
//!     ChipClock::Pal,
//!     None,
//!     &SplitOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(catalog.entries.len(), 1);
//! assert_eq!(catalog.triggers.len(), 1);
//! let fragment = &catalog.entries[0].fragment;
//! assert_eq!(fragment.rows[0].freq1, Some(4096));
//! ```
//!
//! Transcribing the catalog to notes:
//!
//! ```rust
//! use sidfrag::chip::ChipClock;
//! use sidfrag::midi::{MidiTranscriber, TranscribedFragment};
//! use sidfrag::ssf::SplitOptions;
//!
//! let dump = "1 24 15\n1 0 0\n1 1 16\n1 4 17\n100000 4 16\n";
//! let catalog = sidfrag::analyze_dump(
//!     dump,
//!     ChipClock::Pal,
//!     None,
//!     &SplitOptions::default(),
//! )
//! .unwrap();
//!
//! let transcriber = MidiTranscriber::new(ChipClock::Pal);
//! match transcriber.transcribe(&catalog.entries[0].fragment, None) {
//!     TranscribedFragment::Notes(notes) => {
//!         assert_eq!(notes[0].pitch, 59); // B3
//!         assert_eq!(notes[0].velocity, 116);
//!     }
//!     TranscribedFragment::Drum { .. } => unreachable!(),
//! }
//! ```
pub mod binutil;
pub mod canon;
pub mod catalog;
pub mod chip;
pub mod dump;
pub mod midi;
pub mod render;
pub mod resample;
pub mod sidfile;
pub mod ssf;
pub mod state;

pub use binutil::ParseError;
pub use catalog::{CatalogEntry, FragmentCatalog};
pub use ssf::{Fragment, SplitOptions, Trigger};

use chip::ChipClock;

/// Run the full analysis pipeline over one dump text.
///
/// Parses at most `max_states` writes, decodes them into dense state,
/// splits all three voices, canonicalizes and returns the catalog with its
/// trigger log. Malformed input propagates as [`ParseError`].
pub fn analyze_dump(
    text: &str,
    clock: ChipClock,
    max_states: Option<usize>,
    options: &SplitOptions,
) -> Result<FragmentCatalog, ParseError> {
    let writes = dump::parse_dump(text, max_states)?;
    let rows = state::decode_writes(&writes);
    let split = ssf::split_voices(&rows, clock, options);
    log::info!(
        "split {} writes into {} fragments on {} triggers",
        writes.len(),
        split.fragments.len(),
        split.triggers.len()
    );
    let canonical = canon::canonicalize(split.fragments, clock);
    Ok(FragmentCatalog::build(canonical, split.triggers))
}
