//! Reconciliation logic for merging local and remote copies of a kind.
//!
//! This is the core of the sync layer. Given the local collection and the
//! remote collection of one kind, it produces the merged collection and the
//! records that still have to be written to the remote store.
//!
//! # Algorithm
//!
//! 1. Every local record is kept as is (local existence wins)
//! 2. A remote record is adopted only if no local record is equivalent to it
//!    (and no already adopted remote record is)
//! 3. Local records with no equivalent remote record are pushed
//!
//! There is no timestamp comparison. A record deleted locally comes back if
//! the remote copy still holds an equivalent record.
//!
//! For [`MergeStrategy::Overwrite`] kinds the same rule is applied as a keyed
//! dictionary union: remote entries first, local entries replace them.

use crate::{DataKind, MergeStrategy, Origin, SyncRecord};
use serde::{Deserialize, Serialize};

/// A local and a remote record that matched but differ in content.
///
/// The local record is kept; the remote one is discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict<R> {
    pub local: R,
    pub remote: R,
}

/// Result of merging one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<R> {
    /// New local collection
    pub merged: Vec<R>,
    /// Local records missing from the remote copy
    pub to_push: Vec<R>,
    /// Number of remote records added to the local collection
    pub adopted: usize,
    /// Matches whose content differed (local won)
    pub conflicts: Vec<Conflict<R>>,
}

impl<R: SyncRecord> MergeOutcome<R> {
    /// Serializable summary for logging and FFI callers.
    pub fn report(&self, local_count: usize, remote_count: usize) -> MergeReport {
        MergeReport {
            kind: R::KIND,
            local_count,
            remote_count,
            merged_count: self.merged.len(),
            pushed: self.to_push.len(),
            adopted: self.adopted,
            conflicts: self.conflicts.len(),
        }
    }

    /// Whether the merge changes nothing on either side.
    pub fn is_noop(&self) -> bool {
        self.to_push.is_empty() && self.adopted == 0
    }
}

/// Counts describing one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub kind: DataKind,
    pub local_count: usize,
    pub remote_count: usize,
    pub merged_count: usize,
    pub pushed: usize,
    pub adopted: usize,
    pub conflicts: usize,
}

/// Merge the local and remote collections of one kind.
pub fn merge<R: SyncRecord>(local: &[R], remote: &[R]) -> MergeOutcome<R> {
    let (merged, adopted, conflicts) = match R::KIND.strategy() {
        MergeStrategy::Union => merge_union(local, remote),
        MergeStrategy::Overwrite => merge_overwrite(local, remote),
    };

    let to_push = local
        .iter()
        .filter(|l| !remote.iter().any(|r| l.is_equivalent(r)))
        .cloned()
        .collect();

    MergeOutcome {
        merged,
        to_push,
        adopted,
        conflicts,
    }
}

type Merged<R> = (Vec<R>, usize, Vec<Conflict<R>>);

fn merge_union<R: SyncRecord>(local: &[R], remote: &[R]) -> Merged<R> {
    let mut merged = local.to_vec();
    let mut conflicts = Vec::new();

    for r in remote {
        if let Some(l) = local.iter().find(|l| l.is_equivalent(r)) {
            if l != r {
                conflicts.push(Conflict {
                    local: l.clone(),
                    remote: r.clone(),
                });
            }
            continue;
        }
        // Duplicates inside the remote copy are adopted once
        if merged[local.len()..].iter().any(|a| a.is_equivalent(r)) {
            continue;
        }
        merged.push(r.clone());
    }

    let adopted = merged.len() - local.len();
    (merged, adopted, conflicts)
}

fn merge_overwrite<R: SyncRecord>(local: &[R], remote: &[R]) -> Merged<R> {
    let mut merged: Vec<(R, Origin)> = Vec::with_capacity(local.len() + remote.len());
    for r in remote {
        match merged.iter_mut().find(|(m, _)| m.is_equivalent(r)) {
            Some(slot) => slot.0 = r.clone(),
            None => merged.push((r.clone(), Origin::Remote)),
        }
    }

    let mut conflicts = Vec::new();
    for l in local {
        match merged.iter_mut().find(|(m, _)| m.is_equivalent(l)) {
            Some(slot) => {
                if slot.1 == Origin::Remote && slot.0 != *l {
                    conflicts.push(Conflict {
                        local: l.clone(),
                        remote: slot.0.clone(),
                    });
                }
                *slot = (l.clone(), Origin::Local);
            }
            None => merged.push((l.clone(), Origin::Local)),
        }
    }

    let adopted = merged.iter().filter(|(_, o)| *o == Origin::Remote).count();
    (merged.into_iter().map(|(r, _)| r).collect(), adopted, conflicts)
}

/// What the live-update path should do with a remote snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldAction<R> {
    /// The snapshot matches the current collection
    Unchanged,
    /// Replace the local collection with the remote one
    Replace(Vec<R>),
}

/// Fold a remote snapshot into the current local collection.
///
/// One-directional: the remote copy replaces the local one whenever their
/// record sets differ. Nothing is ever written back to the remote store.
pub fn fold_remote<R: SyncRecord>(current: &[R], remote: Vec<R>) -> FoldAction<R> {
    if same_record_set(current, &remote) {
        FoldAction::Unchanged
    } else {
        FoldAction::Replace(remote)
    }
}

/// Order-insensitive structural equality of two collections (as multisets).
pub fn same_record_set<R: PartialEq>(a: &[R], b: &[R]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let hit = b
            .iter()
            .enumerate()
            .position(|(i, y)| !used[i] && x == y);
        match hit {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}
