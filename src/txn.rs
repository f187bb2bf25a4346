//! Transactional access to rooted repositories.
//!
//! A rooted repository aggregates the references of every upstream that
//! shares one root commit. Writers never touch it directly: they stage into
//! a scratch location handed out by [`RootedTransactioner::begin`] and either
//! commit or roll back. The caller holds the per-root lock for the whole
//! transaction.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::core::Sha1;
use crate::error::{Effect, Transience};

pub trait RootedTransactioner: Send + Sync {
    fn begin(&self, root: Sha1) -> Result<Box<dyn RootedTransaction>, TxnError>;
}

/// One open write transaction against a single rooted repository.
///
/// Must end in exactly one of `commit` or `rollback`; both consume the
/// transaction.
pub trait RootedTransaction {
    /// Location of the staging repository that receives the push.
    fn storer(&self) -> &Path;

    fn commit(self: Box<Self>) -> Result<(), TxnError>;

    fn rollback(self: Box<Self>) -> Result<(), TxnError>;
}

#[derive(Error, Debug)]
pub enum TxnError {
    #[error("staging transaction for root {root} failed: {source}")]
    Begin {
        root: Sha1,
        #[source]
        source: git2::Error,
    },

    #[error("committing transaction for root {root} failed: {source}")]
    Commit {
        root: Sha1,
        #[source]
        source: git2::Error,
    },

    #[error("rolling back transaction for root {root} failed: {source}")]
    Rollback {
        root: Sha1,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl TxnError {
    pub fn transience(&self) -> Transience {
        match self {
            TxnError::Begin { .. } | TxnError::Io(_) => Transience::Retryable,
            TxnError::Commit { .. } => Transience::Unknown,
            TxnError::Rollback { .. } => Transience::Retryable,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            TxnError::Begin { .. } => Effect::None,
            // A failed commit may have partially published.
            TxnError::Commit { .. } => Effect::Unknown,
            TxnError::Rollback { .. } | TxnError::Io(_) => Effect::Some,
        }
    }
}
