use thiserror::Error;

use crate::archive::{ArchiveError, CloneError, RefsError};
use crate::config::ConfigError;
use crate::lock::LockError;
use crate::store::StoreError;
use crate::txn::TxnError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over the capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Refs(#[from] RefsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Archive(e) => e.transience(),
            Error::Clone(e) => e.transience(),
            Error::Refs(e) => e.transience(),
            Error::Store(e) => e.transience(),
            Error::Lock(e) => e.transience(),
            Error::Txn(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Archive(e) => e.effect(),
            Error::Clone(e) => e.effect(),
            Error::Refs(e) => e.effect(),
            Error::Store(e) => e.effect(),
            Error::Lock(e) => e.effect(),
            Error::Txn(e) => e.effect(),
            Error::Config(_) => Effect::None,
        }
    }
}
