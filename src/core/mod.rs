//! Model types shared by the archiver and its collaborators.

use thiserror::Error;

mod identity;
mod reference;
mod repository;

pub use identity::{RepositoryId, Sha1};
pub use reference::{Reference, last_commit_time, refs_by_name};
pub use repository::{FetchStatus, Repository};

/// Errors from parsing model values out of their textual forms.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid sha1 {raw:?}: {reason}")]
    InvalidHash { raw: String, reason: String },

    #[error("invalid repository id {raw:?}: {source}")]
    InvalidRepositoryId {
        raw: String,
        #[source]
        source: uuid::Error,
    },
}
