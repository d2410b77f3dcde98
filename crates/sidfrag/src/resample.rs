//! Resampling: cycle-indexed fragment rows onto the playroutine frame grid.
//!
//! Downstream pattern matching wants one row per playroutine call, not one
//! row per register write. Within each `pr_frame` the last write wins for
//! mutable state (that is what the next call observes), while the frame
//! keeps the first row's cycle so the frame grid stays aligned with the
//! video frame counter. The gate-on ADSR nibbles apply to the whole
//! fragment and are carried into every frame row as constants; release is
//! latched at gate-off and stays on its own frame.

use crate::ssf::{Fragment, SsfRow};

/// Reduce a fragment to one row per distinct `pr_frame`.
///
/// Rows come out in frame order, still indexed by cycle. The padding row,
/// when present, lands in its own frame and marks the fragment end.
pub fn resample_to_pr_frames(fragment: &Fragment) -> Vec<SsfRow> {
    let rows = &fragment.rows;
    if rows.is_empty() {
        return Vec::new();
    }

    // Release is latched at gate-off, not gate-on, and stays per-row.
    let adsr = (rows[0].atk1, rows[0].dec1, rows[0].sus1);

    let mut frames: Vec<SsfRow> = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let frame = rows[i].pr_frame;
        let first_clock = rows[i].clock;
        let first_vbi = rows[i].vbi_frame;
        let mut last = rows[i];
        while i + 1 < rows.len() && rows[i + 1].pr_frame == frame {
            i += 1;
            last = rows[i];
        }
        last.clock = first_clock;
        last.vbi_frame = first_vbi;
        (last.atk1, last.dec1, last.sus1) = adsr;
        frames.push(last);
        i += 1;
    }
    frames
}
