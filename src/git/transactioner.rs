//! Filesystem-backed rooted repository storage.
//!
//! Rooted repositories are bare repositories laid out under a two-level
//! fan-out by root hash (`<rooted_dir>/<aa>/<hash>.git`). A transaction
//! stages into a throwaway bare repository seeded from the canonical one;
//! commit publishes the staging refs back (with pruning, so deletions
//! propagate) and rollback simply discards the staging directory. The caller
//! holds the per-root lock for the whole transaction, so publish never
//! races another writer of the same root.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{FetchOptions, FetchPrune, Repository};
use uuid::Uuid;

use crate::core::Sha1;
use crate::txn::{RootedTransaction, RootedTransactioner, TxnError};

const MIRROR_REFSPEC: &str = "+refs/*:refs/*";

pub struct FsTransactioner {
    rooted_dir: PathBuf,
    staging_dir: PathBuf,
}

impl FsTransactioner {
    pub fn new(rooted_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            rooted_dir: rooted_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Canonical location of the rooted repository for `root`.
    pub fn rooted_path(&self, root: Sha1) -> PathBuf {
        let hex = root.to_hex();
        self.rooted_dir.join(&hex[..2]).join(format!("{}.git", hex))
    }
}

impl RootedTransactioner for FsTransactioner {
    fn begin(&self, root: Sha1) -> Result<Box<dyn RootedTransaction>, TxnError> {
        let staging = self
            .staging_dir
            .join(format!("{}-{}", root.to_hex(), Uuid::new_v4().simple()));
        fs::create_dir_all(&staging)?;

        let repo =
            Repository::init_bare(&staging).map_err(|source| TxnError::Begin { root, source })?;

        let canonical = self.rooted_path(root);
        if canonical.exists() {
            mirror(&repo, &canonical, false).map_err(|source| TxnError::Begin { root, source })?;
        }

        Ok(Box::new(FsTransaction {
            root,
            canonical,
            staging,
            done: false,
        }))
    }
}

struct FsTransaction {
    root: Sha1,
    canonical: PathBuf,
    staging: PathBuf,
    done: bool,
}

impl RootedTransaction for FsTransaction {
    fn storer(&self) -> &Path {
        &self.staging
    }

    fn commit(mut self: Box<Self>) -> Result<(), TxnError> {
        let root = self.root;

        if let Some(parent) = self.canonical.parent() {
            fs::create_dir_all(parent)?;
        }
        let canonical = if self.canonical.exists() {
            Repository::open(&self.canonical)
        } else {
            Repository::init_bare(&self.canonical)
        }
        .map_err(|source| TxnError::Commit { root, source })?;

        // Prune so refs deleted in staging disappear from the canonical side.
        mirror(&canonical, &self.staging, true)
            .map_err(|source| TxnError::Commit { root, source })?;

        self.done = true;
        if let Err(err) = fs::remove_dir_all(&self.staging) {
            tracing::warn!(root = %root, error = %err, "failed to remove staging repository");
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), TxnError> {
        let root = self.root;
        self.done = true;
        fs::remove_dir_all(&self.staging).map_err(|source| TxnError::Rollback { root, source })
    }
}

impl Drop for FsTransaction {
    fn drop(&mut self) {
        if !self.done {
            let _ = fs::remove_dir_all(&self.staging);
        }
    }
}

/// Fetch every ref of `from` into `into`, force-updating and optionally
/// pruning refs that no longer exist on the source.
fn mirror(into: &Repository, from: &Path, prune: bool) -> Result<(), git2::Error> {
    let mut remote = into.remote_anonymous(&from.display().to_string())?;
    let mut options = FetchOptions::new();
    if prune {
        options.prune(FetchPrune::On);
    }
    remote.fetch(&[MIRROR_REFSPEC], Some(&mut options), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_in(repo: &Repository, refname: &str, contents: &str) -> git2::Oid {
        let sig = git2::Signature::now("archiver", "archiver@localhost").unwrap();
        let blob = repo.blob(contents.as_bytes()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert("file", blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        repo.commit(Some(refname), &sig, &sig, contents, &tree, &[])
            .unwrap()
    }

    fn transactioner() -> (tempfile::TempDir, FsTransactioner) {
        let dir = tempfile::tempdir().unwrap();
        let tx = FsTransactioner::new(dir.path().join("rooted"), dir.path().join("staging"));
        (dir, tx)
    }

    #[test]
    fn rooted_path_fans_out_by_prefix() {
        let (_dir, tx) = transactioner();
        let root = Sha1::from_bytes([0xab; 20]);
        let path = tx.rooted_path(root);
        assert!(path.ends_with(format!("ab/{}.git", root.to_hex())));
    }

    #[test]
    fn commit_publishes_a_new_root() {
        let (_dir, tx) = transactioner();
        let root = Sha1::from_bytes([1; 20]);

        let txn = tx.begin(root).unwrap();
        let staging = Repository::open(txn.storer()).unwrap();
        commit_in(&staging, "refs/heads/main/abc", "one");
        drop(staging);
        txn.commit().unwrap();

        let canonical = Repository::open(tx.rooted_path(root)).unwrap();
        assert!(canonical.refname_to_id("refs/heads/main/abc").is_ok());
    }

    #[test]
    fn rollback_discards_staging() {
        let (_dir, tx) = transactioner();
        let root = Sha1::from_bytes([2; 20]);

        let txn = tx.begin(root).unwrap();
        let staging_path = txn.storer().to_path_buf();
        txn.rollback().unwrap();

        assert!(!staging_path.exists());
        assert!(!tx.rooted_path(root).exists());
    }

    #[test]
    fn staging_is_seeded_from_the_canonical_repository() {
        let (_dir, tx) = transactioner();
        let root = Sha1::from_bytes([3; 20]);

        let txn = tx.begin(root).unwrap();
        let staging = Repository::open(txn.storer()).unwrap();
        commit_in(&staging, "refs/heads/main/abc", "one");
        drop(staging);
        txn.commit().unwrap();

        let txn = tx.begin(root).unwrap();
        let staging = Repository::open(txn.storer()).unwrap();
        assert!(staging.refname_to_id("refs/heads/main/abc").is_ok());
        drop(staging);
        txn.rollback().unwrap();
    }

    #[test]
    fn commit_prunes_refs_deleted_in_staging() {
        let (_dir, tx) = transactioner();
        let root = Sha1::from_bytes([4; 20]);

        let txn = tx.begin(root).unwrap();
        let staging = Repository::open(txn.storer()).unwrap();
        commit_in(&staging, "refs/heads/keep/abc", "keep");
        commit_in(&staging, "refs/heads/drop/abc", "drop");
        drop(staging);
        txn.commit().unwrap();

        let txn = tx.begin(root).unwrap();
        let staging = Repository::open(txn.storer()).unwrap();
        staging
            .find_reference("refs/heads/drop/abc")
            .unwrap()
            .delete()
            .unwrap();
        drop(staging);
        txn.commit().unwrap();

        let canonical = Repository::open(tx.rooted_path(root)).unwrap();
        assert!(canonical.refname_to_id("refs/heads/keep/abc").is_ok());
        assert!(canonical.refname_to_id("refs/heads/drop/abc").is_err());
    }
}
