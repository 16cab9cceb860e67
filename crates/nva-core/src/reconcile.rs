//! Identity reconciliation across blob entries
//!
//! Entries are scattered over variables, agents and graphs, but identity is a
//! plain many-to-one mapping from entry to [`BlobId`]. These helpers work on
//! any collection of entries and never hold references between owners.
//!
//! Two kinds of inconsistency are reported:
//! - entries that agree on the blob id but disagree on what the bytes are
//!   (hash or size differ), and
//! - one origin id bound to more than one blob id, which means the same local
//!   object was uploaded twice and one of the blobs is an orphan.

use crate::{BlobEntry, BlobId};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    DivergentContent {
        blob_id: BlobId,
        hashes: BTreeSet<String>,
        sizes: BTreeSet<u64>,
    },
    DuplicateAssignment {
        origin_id: Uuid,
        blob_ids: BTreeSet<BlobId>,
    },
}

/// Group entries by the blob they reference. Blobless entries are skipped.
pub fn group_by_blob<'a, I>(entries: I) -> BTreeMap<BlobId, Vec<&'a BlobEntry>>
where
    I: IntoIterator<Item = &'a BlobEntry>,
{
    let mut groups: BTreeMap<BlobId, Vec<&'a BlobEntry>> = BTreeMap::new();
    for entry in entries {
        if entry.is_blobless() {
            continue;
        }
        groups.entry(entry.blob_id()).or_default().push(entry);
    }
    groups
}

fn normalized_hash(entry: &BlobEntry) -> String {
    entry.hash().trim().to_ascii_lowercase()
}

/// Equal, non-empty hashes: evidence (not proof) of identical content.
pub fn content_matches(a: &BlobEntry, b: &BlobEntry) -> bool {
    let hash = normalized_hash(a);
    !hash.is_empty() && hash == normalized_hash(b)
}

pub fn find_conflicts<'a, I>(entries: I) -> Vec<Conflict>
where
    I: IntoIterator<Item = &'a BlobEntry>,
{
    let entries: Vec<&BlobEntry> = entries.into_iter().collect();
    let mut conflicts = Vec::new();

    for (blob_id, group) in group_by_blob(entries.iter().copied()) {
        let hashes: BTreeSet<String> = group
            .iter()
            .map(|e| normalized_hash(e))
            .filter(|h| !h.is_empty())
            .collect();
        let sizes: BTreeSet<u64> = group.iter().filter_map(|e| e.size()).collect();
        if hashes.len() > 1 || sizes.len() > 1 {
            conflicts.push(Conflict::DivergentContent {
                blob_id,
                hashes,
                sizes,
            });
        }
    }

    let mut by_origin: BTreeMap<Uuid, BTreeSet<BlobId>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.is_blobless()) {
        by_origin
            .entry(entry.origin_id())
            .or_default()
            .insert(entry.blob_id());
    }
    for (origin_id, blob_ids) in by_origin {
        if blob_ids.len() > 1 {
            conflicts.push(Conflict::DuplicateAssignment {
                origin_id,
                blob_ids,
            });
        }
    }

    conflicts
}
