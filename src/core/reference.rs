//! References and their root annotations.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Sha1;

/// A named pointer within an upstream repository, annotated with the root
/// commits its target reaches.
///
/// `init` is the canonical root: the smallest member of `roots` in byte
/// order. Two references are the same identity when their names match, and
/// the same content when name, hash and init all match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub hash: Sha1,
    pub init: Sha1,
    pub roots: BTreeSet<Sha1>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl Reference {
    pub fn same_identity(&self, other: &Reference) -> bool {
        self.name == other.name
    }

    pub fn same_content(&self, other: &Reference) -> bool {
        self.name == other.name && self.hash == other.hash && self.init == other.init
    }
}

/// Index a reference list by name. Later duplicates win, matching how the
/// persisted list is treated as a set keyed by name.
pub fn refs_by_name(refs: &[Reference]) -> HashMap<String, Reference> {
    refs.iter()
        .map(|r| (r.name.clone(), r.clone()))
        .collect()
}

/// Timestamp of the most recent commit any reference points at. `None` iff
/// the list is empty.
pub fn last_commit_time(refs: &[Reference]) -> Option<OffsetDateTime> {
    refs.iter().map(|r| r.time).max()
}
