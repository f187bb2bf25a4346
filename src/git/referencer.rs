//! Reference enumeration over a live repository, with root discovery.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use git2::Repository;
use time::OffsetDateTime;

use crate::archive::{Referencer, RefsError};
use crate::core::{Reference, Sha1};

use super::sha1_from_oid;

/// Enumerates the branches and tags of a repository, annotating each with
/// every root commit its target reaches.
///
/// Annotated tags are peeled one level; references that do not resolve to a
/// commit (tags on blobs or trees) are skipped with a warning. Root walks
/// are memoized per tip within one `references` call, since many refs of a
/// repository usually share history.
pub struct GitReferencer<'a> {
    repo: &'a Repository,
    roots_cache: RefCell<HashMap<git2::Oid, BTreeSet<Sha1>>>,
}

impl<'a> GitReferencer<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            roots_cache: RefCell::new(HashMap::new()),
        }
    }

    fn roots_of(&self, tip: git2::Oid) -> Result<BTreeSet<Sha1>, RefsError> {
        if let Some(roots) = self.roots_cache.borrow().get(&tip) {
            return Ok(roots.clone());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push(tip)?;

        let mut roots = BTreeSet::new();
        for oid in walk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            if commit.parent_count() == 0 {
                roots.insert(sha1_from_oid(oid));
            }
        }

        self.roots_cache.borrow_mut().insert(tip, roots.clone());
        Ok(roots)
    }
}

impl Referencer for GitReferencer<'_> {
    fn references(&self) -> Result<Vec<Reference>, RefsError> {
        let mut out = Vec::new();

        for reference in self.repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };
            if !name.starts_with("refs/heads/") && !name.starts_with("refs/tags/") {
                continue;
            }
            let name = name.to_string();

            let commit = match reference.peel_to_commit() {
                Ok(commit) => commit,
                Err(err) => {
                    tracing::warn!(reference = %name, error = %err,
                        "skipping reference that does not resolve to a commit");
                    continue;
                }
            };

            let roots = self
                .roots_of(commit.id())
                .map_err(|source| match source {
                    RefsError::Git(source) => RefsError::Walk {
                        reference: name.clone(),
                        source,
                    },
                    other => other,
                })?;
            let init = *roots
                .iter()
                .next()
                .expect("a commit walk always reaches at least one root");

            out.push(Reference {
                name,
                hash: sha1_from_oid(commit.id()),
                init,
                roots,
                time: commit_time(&commit),
            });
        }

        Ok(out)
    }
}

fn commit_time(commit: &git2::Commit<'_>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(commit.time().seconds())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
