//! Scratch clones of upstream repositories.
//!
//! Each clone is a bare repository under the scratch directory holding every
//! branch and tag of the upstream. The handle pushes per-root slices of them
//! into rooted storage and is deleted on close.

use std::fs;
use std::path::PathBuf;

use git2::{AutotagOption, FetchOptions, Repository};
use uuid::Uuid;

use crate::archive::{
    CloneError, RefSpec, Referencer, RefsError, TemporaryCloner, TemporaryRepository,
};
use crate::core::Repository as RepositoryModel;

use super::inproc;
use super::referencer::GitReferencer;

const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// Clones upstream repositories into a scratch directory.
pub struct GitCloner {
    scratch_dir: PathBuf,
}

impl GitCloner {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }
}

impl TemporaryCloner for GitCloner {
    fn clone_repository(
        &self,
        id: &str,
        url: &str,
    ) -> Result<Box<dyn TemporaryRepository>, CloneError> {
        let path = self
            .scratch_dir
            .join(format!("{}-{}", id, Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;

        let repo = match Repository::init_bare(&path) {
            Ok(repo) => repo,
            Err(err) => {
                let _ = fs::remove_dir_all(&path);
                return Err(CloneError::Git(err));
            }
        };

        {
            let mut remote = match repo.remote_anonymous(url) {
                Ok(remote) => remote,
                Err(err) => {
                    let _ = fs::remove_dir_all(&path);
                    return Err(CloneError::Git(err));
                }
            };
            let mut options = FetchOptions::new();
            options.download_tags(AutotagOption::All);
            if let Err(err) = remote.fetch(&FETCH_REFSPECS, Some(&mut options), None) {
                let _ = fs::remove_dir_all(&path);
                return Err(classify_transport_error(err));
            }
        }

        Ok(Box::new(GitTemporaryRepository { path, repo }))
    }
}

/// Map a transport failure onto the well-known clone outcomes the archiver
/// reacts to. Anything unrecognized stays a plain fetch failure.
fn classify_transport_error(err: git2::Error) -> CloneError {
    use git2::ErrorCode;

    if err.code() == ErrorCode::Auth {
        return CloneError::AuthenticationRequired;
    }

    let message = err.message().to_ascii_lowercase();
    if message.contains("authentication") || message.contains("401") {
        return CloneError::AuthenticationRequired;
    }
    if err.code() == ErrorCode::NotFound
        || message.contains("repository not found")
        || message.contains("404")
    {
        return CloneError::RepositoryNotFound;
    }
    if message.contains("empty") && message.contains("upload-pack") {
        return CloneError::EmptyUploadPackRequest;
    }

    CloneError::Fetch(err)
}

struct GitTemporaryRepository {
    path: PathBuf,
    repo: Repository,
}

impl Referencer for GitTemporaryRepository {
    fn references(&self) -> Result<Vec<crate::core::Reference>, RefsError> {
        GitReferencer::new(&self.repo).references()
    }
}

impl TemporaryRepository for GitTemporaryRepository {
    fn store_config(&self, model: &RepositoryModel) -> Result<(), CloneError> {
        let mut config = self.repo.config().map_err(CloneError::Config)?;
        let remote = format!("remote.{}", model.id);
        for (i, endpoint) in model.endpoints.iter().enumerate() {
            let key = format!("{}.url", remote);
            let result = if i == 0 {
                config.set_str(&key, endpoint)
            } else {
                config.set_multivar(&key, "$^", endpoint)
            };
            result.map_err(CloneError::Config)?;
        }
        config
            .set_str(&format!("{}.fetch", remote), "+refs/*:refs/*")
            .map_err(CloneError::Config)?;
        Ok(())
    }

    fn push(&self, url: &str, refspecs: &[RefSpec]) -> Result<(), CloneError> {
        let target = match inproc::resolve(url) {
            Some(path) => path.display().to_string(),
            None if url.starts_with(inproc::SCHEME) => {
                return Err(CloneError::UnknownPushTarget(url.to_string()));
            }
            None => url.to_string(),
        };

        let mut remote = self.repo.remote_anonymous(&target)?;
        let specs: Vec<&str> = refspecs.iter().map(RefSpec::as_str).collect();
        remote.push(&specs, None).map_err(CloneError::Push)
    }

    fn close(self: Box<Self>) -> Result<(), CloneError> {
        let GitTemporaryRepository { path, repo } = *self;
        drop(repo);
        fs::remove_dir_all(&path).map_err(CloneError::Cleanup)
    }
}
