//! Fragment canonicalization: jitter collapse and end-row padding.
//!
//! Two fragments played by the same routine rarely land on identical
//! cycles: the host's timing loop drifts by a few CPU cycles per call.
//! Fragments whose non-timing rows hash identically and whose clock
//! columns differ elementwise by no more than [`JITTER_MAX`] cycles are the
//! same musical object; the first one encountered becomes the canonical
//! representative and later matches remap onto its hash id.
//!
//! Canonical fragments are then padded with one explicit end row so every
//! fragment is a complete playable segment with a known duration.

use std::collections::HashMap;

use log::debug;

use crate::chip::ChipClock;
use crate::ssf::Fragment;

/// Largest elementwise clock drift, in cycles, still considered jitter.
pub const JITTER_MAX: u64 = 1024;

/// True when two clock columns are jitter-equivalent: same length,
/// elementwise absolute difference at most `JITTER_MAX`.
fn jitter_equivalent(a: &Fragment, b: &Fragment) -> bool {
    let a_rows = a.content_rows();
    let b_rows = b.content_rows();
    if a_rows.len() != b_rows.len() {
        return false;
    }
    a_rows
        .iter()
        .zip(b_rows)
        .all(|(x, y)| x.clock.abs_diff(y.clock) <= JITTER_MAX)
}

/// Final vbi_frame of the fragment's content rows, part of the match key.
fn final_vbi(fragment: &Fragment) -> u64 {
    fragment
        .content_rows()
        .last()
        .map(|r| r.vbi_frame)
        .unwrap_or(0)
}

/// Append the explicit end row: the last row repeated at the fragment's
/// measured duration, with its frame columns recomputed. No-op when the
/// fragment is already padded.
fn pad_fragment(fragment: &mut Fragment, clock: ChipClock) {
    if fragment.padded {
        return;
    }
    let last = *fragment
        .rows
        .last()
        .expect("canonical fragment has at least one row");

    // The measured duration is usable only when it extends past the last
    // state change; otherwise fall back to one video frame of tail.
    let cycles_per_frame = clock.cycles_per_frame();
    let duration = match fragment.clock_duration {
        Some(d) if d > last.clock => d,
        _ => last.clock + cycles_per_frame,
    };

    let mut end = last;
    end.clock = duration;
    end.vbi_frame = duration / cycles_per_frame;
    end.pr_frame = match fragment.rate {
        Some(r) => duration / r,
        None => end.vbi_frame,
    };
    fragment.rows.push(end);
    fragment.padded = true;
}

/// Result of canonicalization: the deduplicated, padded representatives and
/// the hash-id remap for every input fragment.
#[derive(Debug, Clone, Default)]
pub struct CanonicalOutput {
    /// One padded representative per distinct fragment, in first-seen order.
    pub fragments: Vec<Fragment>,
    /// Maps every input `hashid` to its canonical `hashid`. Identity for
    /// representatives.
    pub remap: HashMap<u64, u64>,
}

/// Collapse jitter-equivalent fragments and pad the representatives.
///
/// Fragments are considered in input order; the first of each equivalence
/// group is the representative. Running the function again on its own
/// output is the identity (padding rows are excluded from matching).
pub fn canonicalize(fragments: Vec<Fragment>, clock: ChipClock) -> CanonicalOutput {
    let mut out = CanonicalOutput::default();
    // Group candidates by (hashid_noclock, final vbi_frame); only fragments
    // sharing both can be jitter-equivalent.
    let mut groups: HashMap<(u64, u64), Vec<usize>> = HashMap::new();

    for fragment in fragments {
        let key = (fragment.hashid_noclock, final_vbi(&fragment));
        let candidates = groups.entry(key).or_default();

        let rep = candidates
            .iter()
            .find(|&&i| {
                let rep = &out.fragments[i];
                rep.hashid == fragment.hashid || jitter_equivalent(rep, &fragment)
            })
            .copied();

        match rep {
            Some(i) => {
                let canonical = out.fragments[i].hashid;
                if canonical != fragment.hashid {
                    debug!(
                        "fragment {:016x} collapses to {:016x}",
                        fragment.hashid, canonical
                    );
                }
                out.remap.insert(fragment.hashid, canonical);
            }
            None => {
                out.remap.insert(fragment.hashid, fragment.hashid);
                candidates.push(out.fragments.len());
                let mut fragment = fragment;
                pad_fragment(&mut fragment, clock);
                out.fragments.push(fragment);
            }
        }
    }
    out
}
