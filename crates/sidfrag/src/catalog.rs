//! Fragment catalog: deduplicated fragments plus the trigger log.
//!
//! The catalog maps each canonical `hashid` to its padded fragment and an
//! occurrence count; the trigger log records which fragment fired on which
//! voice at which absolute cycle. Both are plain data with serde derives so
//! the serialized view round-trips bit-identically, hash ids included.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::canon::CanonicalOutput;
use crate::ssf::{Fragment, Trigger};

/// One catalog entry: a canonical fragment and how often it was triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub fragment: Fragment,
    pub count: u64,
}

/// Deduplicated fragment table plus the time-indexed trigger log.
///
/// Entries are held in serialized order: descending occurrence count,
/// hash id as the tie-break. Triggers are ordered by absolute cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentCatalog {
    pub entries: Vec<CatalogEntry>,
    pub triggers: Vec<Trigger>,
}

impl FragmentCatalog {
    /// Assemble a catalog from canonicalized fragments and the raw trigger
    /// log, remapping each trigger onto its canonical hash id.
    pub fn build(canonical: CanonicalOutput, triggers: Vec<Trigger>) -> Self {
        let triggers: Vec<Trigger> = triggers
            .into_iter()
            .map(|t| Trigger {
                hashid: *canonical.remap.get(&t.hashid).unwrap_or(&t.hashid),
                ..t
            })
            .collect();

        let mut counts: HashMap<u64, u64> = HashMap::new();
        for t in &triggers {
            *counts.entry(t.hashid).or_insert(0) += 1;
        }

        let mut entries: Vec<CatalogEntry> = canonical
            .fragments
            .into_iter()
            .map(|fragment| {
                let count = counts.get(&fragment.hashid).copied().unwrap_or(0);
                CatalogEntry { fragment, count }
            })
            .collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.fragment.hashid.cmp(&b.fragment.hashid))
        });

        Self { entries, triggers }
    }

    /// Look up a fragment by canonical hash id.
    pub fn get(&self, hashid: u64) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.fragment.hashid == hashid)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge per-file catalogs into one corpus catalog.
    ///
    /// Counts of identical hash ids sum; the first fragment encountered is
    /// kept. The result is reduced deterministically regardless of input
    /// order by sorting on `(hashid, count)` before re-ranking, so a
    /// parallel corpus run always produces the same catalog.
    pub fn merge(catalogs: Vec<FragmentCatalog>) -> Self {
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut triggers: Vec<Trigger> = Vec::new();
        for catalog in catalogs {
            entries.extend(catalog.entries);
            triggers.extend(catalog.triggers);
        }
        entries.sort_by(|a, b| {
            a.fragment
                .hashid
                .cmp(&b.fragment.hashid)
                .then(b.count.cmp(&a.count))
        });

        let mut merged: Vec<CatalogEntry> = Vec::new();
        for entry in entries {
            match merged.last_mut() {
                Some(last) if last.fragment.hashid == entry.fragment.hashid => {
                    last.count += entry.count;
                }
                _ => merged.push(entry),
            }
        }
        merged.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.fragment.hashid.cmp(&b.fragment.hashid))
        });
        triggers.sort_by_key(|t| (t.clock, t.voice, t.hashid));

        Self {
            entries: merged,
            triggers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize;
    use crate::chip::ChipClock;
    use crate::dump::parse_dump;
    use crate::ssf::{SplitOptions, split_voices};
    use crate::state::decode_writes;

    fn catalog_from(text: &str) -> FragmentCatalog {
        let rows = decode_writes(&parse_dump(text, None).unwrap());
        let out = split_voices(&rows, ChipClock::Pal, &SplitOptions::default());
        let canonical = canonicalize(out.fragments, ChipClock::Pal);
        FragmentCatalog::build(canonical, out.triggers)
    }

    #[test]
    fn test_counts_repeated_fragment() {
        // The same note retriggered three times collapses to one entry.
        let mut text = String::from("1 24 15\n1 1 16\n");
        for _ in 0..3 {
            text.push_str("100 4 17\n30000 4 16\n");
        }
        let catalog = catalog_from(&text);
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.entries[0].count, 3);
        assert_eq!(catalog.triggers.len(), 3);
        let id = catalog.entries[0].fragment.hashid;
        assert!(catalog.triggers.iter().all(|t| t.hashid == id));
    }

    #[test]
    fn test_entries_ordered_by_descending_count() {
        // One fragment fires twice, a different one (other pitch) once.
        let text = "1 24 15\n1 1 16\n\
                    100 4 17\n30000 4 16\n\
                    100 4 17\n30000 4 16\n\
                    100 1 24\n0 4 17\n30000 4 16\n";
        let catalog = catalog_from(text);
        assert_eq!(catalog.entries.len(), 2);
        assert!(catalog.entries[0].count >= catalog.entries[1].count);
        assert_eq!(catalog.entries[0].count, 2);
    }

    #[test]
    fn test_empty_input_yields_empty_catalog() {
        let catalog = catalog_from("");
        assert!(catalog.is_empty());
        assert!(catalog.triggers.is_empty());
    }

    #[test]
    fn test_merge_sums_counts_deterministically() {
        let text = "1 24 15\n1 1 16\n100 4 17\n30000 4 16\n";
        let a = catalog_from(text);
        let b = catalog_from(text);
        let ab = FragmentCatalog::merge(vec![a.clone(), b.clone()]);
        let ba = FragmentCatalog::merge(vec![b, a]);
        assert_eq!(ab, ba);
        assert_eq!(ab.entries.len(), 1);
        assert_eq!(ab.entries[0].count, 2);
    }

    #[test]
    fn test_lookup_by_hashid() {
        let text = "1 24 15\n1 1 16\n100 4 17\n30000 4 16\n";
        let catalog = catalog_from(text);
        let id = catalog.entries[0].fragment.hashid;
        assert!(catalog.get(id).is_some());
        assert!(catalog.get(id ^ 1).is_none());
    }
}
