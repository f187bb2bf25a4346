//! The archive pipeline: reference diffing and the per-job workflow.

mod archiver;
mod changes;
mod cloner;
mod error;
mod referencer;
mod worker;

pub use archiver::{
    Archiver, Job, Notifiers, changes_to_push_refspecs, select_endpoint,
    update_repository_references,
};
pub use changes::{Changes, Command, new_changes};
pub use cloner::{CloneError, RefSpec, TemporaryCloner, TemporaryRepository};
pub use error::{ArchiveError, RootError};
pub use referencer::{ModelReferencer, Referencer, RefsError};
pub use worker::{ArchiverServices, PoolNotifiers, WorkerContext, WorkerPool};
