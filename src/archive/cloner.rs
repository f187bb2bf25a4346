//! Temporary clones of upstream repositories.
//!
//! A job fetches the upstream into scratch storage once, reads its
//! references, then pushes per-root slices of them into rooted storage. The
//! clone lives exactly as long as the job.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::core::Repository;
use crate::error::{Effect, Transience};

use super::referencer::Referencer;

pub trait TemporaryCloner: Send + Sync {
    /// Fetch `url` into scratch storage under a directory derived from `id`.
    fn clone_repository(
        &self,
        id: &str,
        url: &str,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError>;
}

/// Handle to one scratch clone.
pub trait TemporaryRepository: Referencer {
    /// Write remote metadata for the owning repository record into the
    /// clone's config, so the subsequent push is attributed to it.
    fn store_config(&self, repo: &Repository) -> Result<(), CloneError>;

    fn push(&self, url: &str, refspecs: &[RefSpec]) -> Result<(), CloneError>;

    /// Dispose of the scratch storage. Must be called on every exit.
    fn close(self: Box<Self>) -> Result<(), CloneError>;
}

#[derive(Error, Debug)]
pub enum CloneError {
    /// The upstream does not exist at the endpoint.
    #[error("remote repository not found")]
    RepositoryNotFound,

    /// The endpoint wants credentials we do not have.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The upstream exists but has nothing to send.
    #[error("empty upload-pack request")]
    EmptyUploadPackRequest,

    #[error("fetch failed: {0}")]
    Fetch(#[source] git2::Error),

    #[error("push failed: {0}")]
    Push(#[source] git2::Error),

    #[error("writing clone config failed: {0}")]
    Config(#[source] git2::Error),

    #[error("no rooted repository is being served at {0}")]
    UnknownPushTarget(String),

    #[error("removing scratch clone failed: {0}")]
    Cleanup(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl CloneError {
    pub fn transience(&self) -> Transience {
        match self {
            CloneError::RepositoryNotFound
            | CloneError::AuthenticationRequired
            | CloneError::EmptyUploadPackRequest
            | CloneError::Config(_)
            | CloneError::UnknownPushTarget(_) => Transience::Permanent,

            CloneError::Fetch(_)
            | CloneError::Push(_)
            | CloneError::Cleanup(_)
            | CloneError::Io(_) => Transience::Retryable,

            CloneError::Git(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // A failed push may have updated some refs on the receiving side.
            CloneError::Push(_) => Effect::Unknown,
            CloneError::Cleanup(_) => Effect::Some,
            CloneError::Git(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// A push refspec, pre-rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefSpec(String);

impl RefSpec {
    /// `+src:dst`: force-update the destination, since upstream history may
    /// have been rewritten.
    pub fn force(src: &str, dst: &str) -> Self {
        Self(format!("+{}:{}", src, dst))
    }

    /// `:dst`: delete the destination.
    pub fn delete(dst: &str) -> Self {
        Self(format!(":{}", dst))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_delete(&self) -> bool {
        self.0.starts_with(':')
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
