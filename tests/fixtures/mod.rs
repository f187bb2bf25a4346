#![allow(dead_code)]

//! Shared fakes and builders for integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use git2::Repository as Git2Repository;
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;

use grava::archive::{
    ArchiveError, CloneError, Job, RefSpec, Referencer, RefsError, TemporaryCloner,
    TemporaryRepository,
};
use grava::core::{Reference, Repository, RepositoryId, Sha1};
use grava::store::{RepositoryField, RepositoryStore, StoreError};
use grava::txn::{RootedTransaction, RootedTransactioner, TxnError};

pub const T0: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
pub const T1: OffsetDateTime = datetime!(2024-02-01 00:00 UTC);

pub fn sha(b: u8) -> Sha1 {
    Sha1::from_bytes([b; 20])
}

pub fn reference(name: &str, hash: u8, init: u8) -> Reference {
    reference_at(name, hash, init, T0)
}

pub fn reference_at(name: &str, hash: u8, init: u8, time: OffsetDateTime) -> Reference {
    Reference {
        name: name.to_string(),
        hash: sha(hash),
        init: sha(init),
        roots: BTreeSet::from([sha(init)]),
        time,
    }
}

pub fn repository(endpoints: &[&str]) -> Repository {
    Repository::new(
        RepositoryId::generate(),
        endpoints.iter().map(|e| e.to_string()).collect(),
        T0,
    )
}

pub fn job(repo: &Repository) -> Job {
    Job {
        repository_id: repo.id,
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Record table in memory.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RepositoryId, Repository>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, repo: Repository) {
        self.records
            .lock()
            .unwrap()
            .insert(repo.id, repo);
    }

    pub fn get(&self, id: RepositoryId) -> Option<Repository> {
        self.records.lock().unwrap().get(&id).cloned()
    }
}

impl RepositoryStore for MemoryStore {
    fn find_one(&self, id: RepositoryId) -> Result<Option<Repository>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    fn update(&self, repo: &Repository, _fields: &[RepositoryField]) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if !records.contains_key(&repo.id) {
            return Err(StoreError::Backend(format!("no record for {}", repo.id)));
        }
        records.insert(repo.id, repo.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cloner
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushRecord {
    pub url: String,
    pub refspecs: Vec<String>,
}

/// What the next `clone_repository` call should produce.
pub struct CloneScript {
    pub refs: Vec<Reference>,
    /// Fail any push whose refspecs mention this substring.
    pub fail_push_matching: Option<String>,
    pub fail_store_config: bool,
    pub fail_close: bool,
}

impl CloneScript {
    pub fn refs(refs: Vec<Reference>) -> Self {
        Self {
            refs,
            fail_push_matching: None,
            fail_store_config: false,
            fail_close: false,
        }
    }
}

/// Plays back scripted clone outcomes and records every push.
#[derive(Default)]
pub struct FakeCloner {
    outcomes: Mutex<VecDeque<Result<CloneScript, CloneError>>>,
    pushes: Arc<Mutex<Vec<PushRecord>>>,
}

impl FakeCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, outcome: Result<CloneScript, CloneError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.pushes.lock().unwrap().clone()
    }
}

impl TemporaryCloner for FakeCloner {
    fn clone_repository(
        &self,
        _id: &str,
        _url: &str,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError> {
        let script = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CloneScript::refs(Vec::new())))?;
        Ok(Box::new(FakeClone {
            script,
            pushes: Arc::clone(&self.pushes),
        }))
    }
}

struct FakeClone {
    script: CloneScript,
    pushes: Arc<Mutex<Vec<PushRecord>>>,
}

impl Referencer for FakeClone {
    fn references(&self) -> Result<Vec<Reference>, RefsError> {
        Ok(self.script.refs.clone())
    }
}

impl TemporaryRepository for FakeClone {
    fn store_config(&self, _repo: &Repository) -> Result<(), CloneError> {
        if self.script.fail_store_config {
            return Err(CloneError::Config(git2::Error::from_str(
                "config write refused",
            )));
        }
        Ok(())
    }

    fn push(&self, url: &str, refspecs: &[RefSpec]) -> Result<(), CloneError> {
        if let Some(needle) = &self.script.fail_push_matching
            && refspecs.iter().any(|r| r.as_str().contains(needle.as_str()))
        {
            return Err(CloneError::Push(git2::Error::from_str("push refused")));
        }
        self.pushes.lock().unwrap().push(PushRecord {
            url: url.to_string(),
            refspecs: refspecs.iter().map(|r| r.as_str().to_string()).collect(),
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), CloneError> {
        if self.script.fail_close {
            return Err(CloneError::Cleanup(std::io::Error::other(
                "scratch dir busy",
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transactioner
// ---------------------------------------------------------------------------

/// Hands out real bare staging repositories (the archiver opens them before
/// serving), and records which roots were committed or rolled back.
pub struct FakeTransactioner {
    dir: TempDir,
    committed: Arc<Mutex<Vec<Sha1>>>,
    rolled_back: Arc<Mutex<Vec<Sha1>>>,
}

impl FakeTransactioner {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            committed: Arc::default(),
            rolled_back: Arc::default(),
        }
    }

    pub fn committed(&self) -> Vec<Sha1> {
        self.committed.lock().unwrap().clone()
    }

    pub fn rolled_back(&self) -> Vec<Sha1> {
        self.rolled_back.lock().unwrap().clone()
    }
}

impl RootedTransactioner for FakeTransactioner {
    fn begin(&self, root: Sha1) -> Result<Box<dyn RootedTransaction>, TxnError> {
        let staging = self
            .dir
            .path()
            .join(format!("{}-{}", root.to_hex(), uuid::Uuid::new_v4().simple()));
        Git2Repository::init_bare(&staging).map_err(|source| TxnError::Begin { root, source })?;
        Ok(Box::new(FakeTransaction {
            root,
            staging,
            committed: Arc::clone(&self.committed),
            rolled_back: Arc::clone(&self.rolled_back),
        }))
    }
}

struct FakeTransaction {
    root: Sha1,
    staging: std::path::PathBuf,
    committed: Arc<Mutex<Vec<Sha1>>>,
    rolled_back: Arc<Mutex<Vec<Sha1>>>,
}

impl RootedTransaction for FakeTransaction {
    fn storer(&self) -> &std::path::Path {
        &self.staging
    }

    fn commit(self: Box<Self>) -> Result<(), TxnError> {
        self.committed.lock().unwrap().push(self.root);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), TxnError> {
        self.rolled_back.lock().unwrap().push(self.root);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier capture
// ---------------------------------------------------------------------------

/// Counts notifier invocations and keeps warn messages for assertions.
#[derive(Clone, Default)]
pub struct NotifierLog {
    pub starts: Arc<Mutex<Vec<RepositoryId>>>,
    pub stops: Arc<Mutex<Vec<(RepositoryId, Option<String>)>>>,
    pub warns: Arc<Mutex<Vec<String>>>,
}

impl NotifierLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, archiver: &mut grava::Archiver) {
        let starts = Arc::clone(&self.starts);
        archiver.notifiers.start = Some(Box::new(move |job: &Job| {
            starts.lock().unwrap().push(job.repository_id);
        }));

        let stops = Arc::clone(&self.stops);
        archiver.notifiers.stop = Some(Box::new(
            move |job: &Job, err: Option<&ArchiveError>| {
                stops
                    .lock()
                    .unwrap()
                    .push((job.repository_id, err.map(|e| e.to_string())));
            },
        ));

        let warns = Arc::clone(&self.warns);
        archiver.notifiers.warn = Some(Box::new(move |_job: &Job, err: &ArchiveError| {
            warns.lock().unwrap().push(err.to_string());
        }));
    }

    pub fn warn_count(&self) -> usize {
        self.warns.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Git repository builders
// ---------------------------------------------------------------------------

/// Create a commit in a (bare) repository, optionally updating a ref.
pub fn commit(
    repo: &Git2Repository,
    refname: Option<&str>,
    parents: &[git2::Oid],
    contents: &str,
) -> git2::Oid {
    let sig = git2::Signature::now("fixture", "fixture@localhost").unwrap();
    let blob = repo.blob(contents.as_bytes()).unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    builder.insert("file", blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let parents: Vec<git2::Commit<'_>> = parents
        .iter()
        .map(|oid| repo.find_commit(*oid).unwrap())
        .collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

    repo.commit(refname, &sig, &sig, contents, &tree, &parent_refs)
        .unwrap()
}

pub fn oid_to_sha1(oid: git2::Oid) -> Sha1 {
    Sha1::from_hex(&oid.to_string()).unwrap()
}
