//! Change-set computation.
//!
//! Diffs two reference sets (the persisted model vs a fresh clone) into
//! per-root buckets of create/update/delete commands. Each command is
//! bucketed under the canonical root of the reference it touches, so the
//! per-root push loop can treat every bucket independently.

use std::collections::BTreeMap;

use crate::core::{Reference, Sha1, refs_by_name};

use super::referencer::{Referencer, RefsError};

/// A single reference mutation, scoped to one root.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Create { new: Reference },
    Update { old: Reference, new: Reference },
    Delete { old: Reference },
}

impl Command {
    /// The root this command is bucketed under: the subject reference's
    /// `init` (`new` for Create/Update, `old` for Delete).
    pub fn root(&self) -> Sha1 {
        match self {
            Command::Create { new } | Command::Update { new, .. } => new.init,
            Command::Delete { old } => old.init,
        }
    }
}

/// Commands grouped by the root commit they apply to.
///
/// BTreeMap gives deterministic iteration; no ordering is promised to
/// consumers.
pub type Changes = BTreeMap<Sha1, Vec<Command>>;

/// Diff `old` against `new` into per-root commands.
///
/// Per name:
/// - only in `new`: Create under `new.init`;
/// - only in `old`: Delete under `old.init`;
/// - in both with the same init: Update under that root, unless the hash is
///   also unchanged, in which case nothing is emitted;
/// - in both with different inits (the history was rewritten onto another
///   root): Delete under `old.init` and Create under `new.init`.
pub fn new_changes<O, N>(old: &O, new: &N) -> Result<Changes, RefsError>
where
    O: Referencer + ?Sized,
    N: Referencer + ?Sized,
{
    let mut old_refs = refs_by_name(&old.references()?);
    let new_refs = new.references()?;

    let mut changes = Changes::new();
    for new_ref in new_refs {
        match old_refs.remove(&new_ref.name) {
            None => add(&mut changes, Command::Create { new: new_ref }),
            Some(old_ref) if old_ref.init == new_ref.init => {
                if old_ref.hash != new_ref.hash {
                    add(
                        &mut changes,
                        Command::Update {
                            old: old_ref,
                            new: new_ref,
                        },
                    );
                }
            }
            Some(old_ref) => {
                add(&mut changes, Command::Delete { old: old_ref });
                add(&mut changes, Command::Create { new: new_ref });
            }
        }
    }

    // Anything left in the old set vanished upstream.
    for (_, old_ref) in old_refs {
        add(&mut changes, Command::Delete { old: old_ref });
    }

    Ok(changes)
}

fn add(changes: &mut Changes, command: Command) {
    changes.entry(command.root()).or_default().push(command);
}
