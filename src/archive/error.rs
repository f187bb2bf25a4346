//! Archiver error taxonomy.

use thiserror::Error;

use crate::core::{RepositoryId, Sha1};
use crate::error::{Effect, Transience};
use crate::store::StoreError;
use crate::txn::TxnError;

use super::cloner::CloneError;
use super::referencer::RefsError;

/// Job-level failures surfaced by `Archiver::archive`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ArchiveError {
    #[error("repository id not found: {0}")]
    RepositoryIdNotFound(RepositoryId),

    #[error("endpoints is empty")]
    EndpointsEmpty,

    #[error("cloning {endpoint} failed: {source}")]
    Clone {
        endpoint: String,
        #[source]
        source: CloneError,
    },

    #[error("cleaning up scratch clone failed: {0}")]
    CleanRepositoryDir(#[source] CloneError),

    #[error("computing changes failed: {0}")]
    Changes(#[source] RefsError),

    #[error("push to rooted repository {root} failed: {source}")]
    PushToRootedRepository {
        root: Sha1,
        #[source]
        source: Box<RootError>,
    },

    /// Always the outermost error when some, but not necessarily all, roots
    /// failed.
    #[error("archiving {failed} out of {total} roots failed: {roots}")]
    ArchivingRoots {
        failed: usize,
        total: usize,
        roots: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ArchiveError {
    pub fn transience(&self) -> Transience {
        match self {
            ArchiveError::RepositoryIdNotFound(_) | ArchiveError::EndpointsEmpty => {
                Transience::Permanent
            }
            ArchiveError::Clone { source, .. } => source.transience(),
            ArchiveError::CleanRepositoryDir(_) => Transience::Retryable,
            ArchiveError::Changes(source) => source.transience(),
            ArchiveError::PushToRootedRepository { source, .. } => source.transience(),
            // A rerun retries exactly the failed roots.
            ArchiveError::ArchivingRoots { .. } => Transience::Retryable,
            ArchiveError::Store(source) => source.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ArchiveError::RepositoryIdNotFound(_) | ArchiveError::EndpointsEmpty => Effect::None,
            // The failed-fetch metadata was persisted before returning.
            ArchiveError::Clone { .. } => Effect::Some,
            ArchiveError::CleanRepositoryDir(_) => Effect::Some,
            ArchiveError::Changes(_) => Effect::None,
            ArchiveError::PushToRootedRepository { source, .. } => source.effect(),
            // Some roots may have landed.
            ArchiveError::ArchivingRoots { .. } => Effect::Some,
            ArchiveError::Store(source) => source.effect(),
        }
    }
}

/// Why one root's push failed. Wrapped into
/// [`ArchiveError::PushToRootedRepository`]. Lock acquisition failures never
/// appear here: they happen before the transaction opens and only mark the
/// root failed.
#[derive(Error, Debug)]
pub enum RootError {
    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error("opening rooted storer failed: {0}")]
    OpenStorer(#[source] git2::Error),

    #[error("storing clone config failed: {0}")]
    StoreConfig(#[source] CloneError),

    #[error("push failed: {0}")]
    Push(#[source] CloneError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RootError {
    pub fn transience(&self) -> Transience {
        match self {
            RootError::Txn(source) => source.transience(),
            RootError::OpenStorer(_) => Transience::Retryable,
            RootError::StoreConfig(source) | RootError::Push(source) => source.transience(),
            RootError::Store(source) => source.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            RootError::OpenStorer(_) | RootError::StoreConfig(_) => Effect::None,
            RootError::Txn(source) => source.effect(),
            RootError::Push(source) => source.effect(),
            // The rooted commit already landed; only the model write failed.
            RootError::Store(_) => Effect::Some,
        }
    }
}
