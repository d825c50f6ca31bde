//! Causal frontier maintenance
//!
//! A key's entry list only ever holds mutually concurrent versions: a new
//! version that descends from stored ones replaces them, a concurrent one is
//! kept as a sibling, and anything older or identical is refused.

use crate::clock::Causality;
use crate::error::{Error, Result};
use crate::types::ObjectEntry;

/// How a candidate entry was absorbed into a frontier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// The frontier was empty
    First,
    /// The candidate replaced this many dominated entries
    Superseded(usize),
    /// The candidate was kept next to concurrent entries
    Sibling,
}

/// Insert `candidate` into the frontier `entries` for `key`.
///
/// Fails with [`Error::StaleWrite`] when the candidate is strictly behind a
/// stored entry and [`Error::DuplicateWrite`] when its clock matches a stored
/// entry's. `entries` is untouched on failure.
pub fn insert_entry(
    entries: &mut Vec<ObjectEntry>,
    candidate: ObjectEntry,
    key: &str,
) -> Result<Insertion> {
    if entries.is_empty() {
        entries.push(candidate);
        return Ok(Insertion::First);
    }

    let mut dominated = 0;
    let mut concurrent = false;
    for entry in entries.iter() {
        match candidate.clock().causality(entry.clock()) {
            Causality::Before => {
                return Err(Error::StaleWrite {
                    key: key.to_string(),
                })
            }
            Causality::Equal => {
                return Err(Error::DuplicateWrite {
                    key: key.to_string(),
                })
            }
            Causality::After => dominated += 1,
            Causality::Concurrent => concurrent = true,
        }
    }

    if dominated > 0 {
        entries.retain(|entry| !entry.clock().less_than(candidate.clock()));
        entries.push(candidate);
        Ok(Insertion::Superseded(dominated))
    } else if concurrent {
        entries.push(candidate);
        Ok(Insertion::Sibling)
    } else {
        Err(Error::DuplicateWrite {
            key: key.to_string(),
        })
    }
}

/// Remove every entry strictly dominated by another entry in the list, and
/// collapse exact duplicates (same clock and value) to one copy.
pub fn prune_dominated(entries: &mut Vec<ObjectEntry>) {
    let snapshot = entries.clone();
    entries.retain(|entry| {
        !snapshot
            .iter()
            .any(|other| entry.clock().less_than(other.clock()))
    });

    let mut seen: Vec<ObjectEntry> = Vec::with_capacity(entries.len());
    entries.retain(|entry| {
        if seen.contains(entry) {
            false
        } else {
            seen.push(entry.clone());
            true
        }
    });
}
