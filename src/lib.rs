#![forbid(unsafe_code)]

//! Grava archives upstream git repositories into rooted, content-addressed
//! internal storage.
//!
//! A repository's history may contain several disjoint histories, each with
//! its own root commit; every such root defines one rooted repository in
//! storage, shared across all upstreams that contain it. An archive job
//! fetches one upstream, diffs it against the persisted model, and pushes
//! the per-root deltas into rooted storage under per-root locks.

pub mod archive;
pub mod config;
pub mod core;
pub mod error;
pub mod git;
pub mod lock;
pub mod store;
pub mod telemetry;
pub mod txn;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working vocabulary at the crate root.
pub use crate::archive::{
    ArchiveError, Archiver, Changes, CloneError, Command, Job, ModelReferencer, Notifiers,
    RefSpec, Referencer, TemporaryCloner, TemporaryRepository, new_changes,
};
pub use crate::core::{
    FetchStatus, Reference, Repository, RepositoryId, Sha1, last_commit_time,
};
