//! Reference enumeration.
//!
//! The change-set builder only needs "give me the references of this
//! repository, with their roots"; it does not care whether those come from a
//! live clone or from the persisted model. Both sides implement
//! [`Referencer`].

use thiserror::Error;

use crate::core::{Reference, Repository};
use crate::error::{Effect, Transience};

pub trait Referencer {
    fn references(&self) -> Result<Vec<Reference>, RefsError>;
}

/// The persisted side: returns the model's stored references as-is.
pub struct ModelReferencer<'a>(pub &'a Repository);

impl Referencer for ModelReferencer<'_> {
    fn references(&self) -> Result<Vec<Reference>, RefsError> {
        Ok(self.0.references.clone())
    }
}

#[derive(Error, Debug)]
pub enum RefsError {
    #[error("walking ancestors of {reference} failed: {source}")]
    Walk {
        reference: String,
        #[source]
        source: git2::Error,
    },

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("reference backend error: {0}")]
    Backend(String),
}

impl RefsError {
    pub fn transience(&self) -> Transience {
        match self {
            RefsError::Walk { .. } | RefsError::Git(_) => Transience::Permanent,
            RefsError::Backend(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
