//! Repository record persistence.
//!
//! The archiver talks to storage through [`RepositoryStore`]; production
//! deployments back it with a database. [`FsRepositoryStore`] is a
//! file-per-record implementation good enough for single-host use and tests.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::{Repository, RepositoryId};
use crate::error::{Effect, Transience};

/// Persistable columns of a [`Repository`] record.
///
/// `update` takes the set of fields the caller actually changed so that a
/// column-oriented backend can write only those; document backends are free
/// to rewrite the whole record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryField {
    Endpoints,
    Status,
    FetchedAt,
    FetchErrorAt,
    LastCommitAt,
    References,
    UpdatedAt,
}

pub trait RepositoryStore: Send + Sync {
    fn find_one(&self, id: RepositoryId) -> Result<Option<Repository>, StoreError>;

    fn update(&self, repo: &Repository, fields: &[RepositoryField]) -> Result<(), StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("reading record at {path:?} failed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("encoding record failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Decode { .. } | StoreError::Encode(_) => Transience::Permanent,
            StoreError::Io(_) => Transience::Retryable,
            StoreError::Backend(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // Writes are atomic: a failed write leaves the old record.
            StoreError::Decode { .. } | StoreError::Encode(_) | StoreError::Io(_) => Effect::None,
            StoreError::Backend(_) => Effect::Unknown,
        }
    }
}

/// One JSON document per repository under a flat directory.
pub struct FsRepositoryStore {
    dir: PathBuf,
}

impl FsRepositoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a record that does not exist yet. Repositories are created by
    /// the surrounding scheduler, not by archive jobs.
    pub fn create(&self, repo: &Repository) -> Result<(), StoreError> {
        self.write(repo)
    }

    fn record_path(&self, id: RepositoryId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn write(&self, repo: &Repository) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec_pretty(repo).map_err(StoreError::Encode)?;
        let temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        fs::write(temp.path(), &bytes)?;
        temp.persist(self.record_path(repo.id))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl RepositoryStore for FsRepositoryStore {
    fn find_one(&self, id: RepositoryId) -> Result<Option<Repository>, StoreError> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { path, source })
    }

    fn update(&self, repo: &Repository, _fields: &[RepositoryField]) -> Result<(), StoreError> {
        // Document store: the whole record is rewritten atomically.
        self.write(repo)
    }
}
