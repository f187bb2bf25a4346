//! The per-job archive workflow.
//!
//! One `archive` call: load the model, clone the upstream, diff references,
//! then for each implicated root push the delta into its rooted repository
//! under the root's lock, and fold the surviving commands back into the
//! persisted record. Roots fail independently; a failed root never aborts
//! the rest of the job.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::TryRecvError;
use time::OffsetDateTime;

use crate::core::{Reference, Repository, RepositoryId, Sha1, last_commit_time, refs_by_name};
use crate::core::FetchStatus;
use crate::git::inproc;
use crate::lock::LockSession;
use crate::store::{RepositoryField, RepositoryStore};
use crate::txn::RootedTransactioner;

use super::changes::{Changes, Command, new_changes};
use super::cloner::{CloneError, RefSpec, TemporaryCloner, TemporaryRepository};
use super::error::{ArchiveError, RootError};
use super::referencer::ModelReferencer;

/// One unit of work: refresh one upstream repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    pub repository_id: RepositoryId,
}

type StartFn = Box<dyn Fn(&Job) + Send + Sync>;
type StopFn = Box<dyn Fn(&Job, Option<&ArchiveError>) + Send + Sync>;
type WarnFn = Box<dyn Fn(&Job, &ArchiveError) + Send + Sync>;

/// Optional observation hooks.
#[derive(Default)]
pub struct Notifiers {
    /// Called when a job starts.
    pub start: Option<StartFn>,
    /// Called when a job stops, with its final error if any.
    pub stop: Option<StopFn>,
    /// Called for per-root warnings that do not end the job.
    pub warn: Option<WarnFn>,
}

/// Archives repositories. Instances hold no per-job state and are safe to
/// share across threads; one lock session backs all jobs run through the
/// same instance, so the worker adapter builds one archiver per job.
pub struct Archiver {
    pub notifiers: Notifiers,
    store: Arc<dyn RepositoryStore>,
    transactioner: Arc<dyn RootedTransactioner>,
    cloner: Arc<dyn TemporaryCloner>,
    lock_session: Box<dyn LockSession>,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        transactioner: Arc<dyn RootedTransactioner>,
        cloner: Arc<dyn TemporaryCloner>,
        lock_session: Box<dyn LockSession>,
    ) -> Self {
        Self {
            notifiers: Notifiers::default(),
            store,
            transactioner,
            cloner,
            lock_session,
        }
    }

    /// Archive one repository according to `job`.
    ///
    /// Returns `Ok(())` on full success and on benign clone outcomes (empty
    /// upload-pack, upstream gone). Partial per-root failure returns
    /// [`ArchiveError::ArchivingRoots`].
    pub fn archive(&self, job: &Job) -> Result<(), ArchiveError> {
        self.notify_start(job);
        let result = self.run(job);
        self.notify_stop(job, result.as_ref().err());
        result
    }

    fn run(&self, job: &Job) -> Result<(), ArchiveError> {
        let now = OffsetDateTime::now_utc();

        let mut repo = self
            .store
            .find_one(job.repository_id)?
            .ok_or(ArchiveError::RepositoryIdNotFound(job.repository_id))?;
        tracing::debug!(
            repository = %repo.id,
            status = ?repo.status,
            references = repo.references.len(),
            "repository model obtained"
        );

        let endpoint = select_endpoint(&repo.endpoints)?.to_string();
        tracing::debug!(repository = %repo.id, endpoint = %endpoint, "endpoint selected");

        let clone = match self
            .cloner
            .clone_repository(&job.repository_id.to_string(), &endpoint)
        {
            Ok(clone) => clone,
            Err(err) => {
                tracing::error!(repository = %repo.id, error = %err, "error cloning repository");
                return self.handle_clone_error(&mut repo, &endpoint, err, now);
            }
        };
        tracing::debug!(repository = %repo.id, "remote repository cloned");

        let result = self.process_clone(job, &mut repo, clone.as_ref(), now);
        let closed = clone.close();
        match (result, closed) {
            (Err(err), _) => Err(err),
            (Ok(()), Err(err)) => Err(ArchiveError::CleanRepositoryDir(err)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// The clone failed; decide what that means for the model and the job.
    ///
    /// An empty upload-pack is a no-op. A missing upstream marks the record
    /// NotFound but the job still succeeds. Everything else records the
    /// failed fetch and surfaces the cause.
    fn handle_clone_error(
        &self,
        repo: &mut Repository,
        endpoint: &str,
        err: CloneError,
        now: OffsetDateTime,
    ) -> Result<(), ArchiveError> {
        let outcome = match err {
            CloneError::EmptyUploadPackRequest => Ok(()),
            CloneError::RepositoryNotFound => {
                repo.status = FetchStatus::NotFound;
                repo.fetch_error_at = Some(now);
                Ok(())
            }
            err => {
                repo.fetch_error_at = Some(now);
                Err(ArchiveError::Clone {
                    endpoint: endpoint.to_string(),
                    source: err,
                })
            }
        };

        self.db_update_failed_repository(repo, now)?;
        outcome
    }

    fn process_clone(
        &self,
        job: &Job,
        repo: &mut Repository,
        clone: &dyn TemporaryRepository,
        now: OffsetDateTime,
    ) -> Result<(), ArchiveError> {
        let changes =
            new_changes(&ModelReferencer(repo), clone).map_err(ArchiveError::Changes)?;
        tracing::debug!(repository = %repo.id, roots = changes.len(), "changes computed");

        self.push_changes_to_rooted_repositories(job, repo, clone, &changes, now)
    }

    fn push_changes_to_rooted_repositories(
        &self,
        job: &Job,
        repo: &mut Repository,
        clone: &dyn TemporaryRepository,
        changes: &Changes,
        now: OffsetDateTime,
    ) -> Result<(), ArchiveError> {
        // Nothing to push still counts as a successful, up-to-date fetch.
        if changes.is_empty() {
            self.db_update_repository(repo, now)?;
            return Ok(());
        }

        let mut failed: Vec<Sha1> = Vec::new();

        for (&root, commands) in changes {
            let mut locker = self.lock_session.new_locker(&root.to_hex());
            let lost = match locker.lock() {
                Ok(lost) => lost,
                Err(err) => {
                    tracing::warn!(root = %root, error = %err, "failed to acquire root lock");
                    failed.push(root);
                    continue;
                }
            };

            if let Err(err) = self.push_changes_to_rooted_repository(repo, clone, root, commands)
            {
                let err = ArchiveError::PushToRootedRepository {
                    root,
                    source: Box::new(err),
                };
                self.notify_warn(job, &err);
                failed.push(root);
                if let Err(err) = locker.unlock() {
                    tracing::warn!(root = %root, error = %err, "failed to release root lock");
                }
                continue;
            }

            repo.references = update_repository_references(&repo.references, commands, root);
            if let Err(err) = self.db_update_repository(repo, now) {
                let err = ArchiveError::PushToRootedRepository {
                    root,
                    source: Box::new(RootError::Store(err)),
                };
                self.notify_warn(job, &err);
                failed.push(root);
            }

            // The rooted commit already landed; a lost lease here is
            // diagnostic, not corrective.
            match lost.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    tracing::error!(root = %root, "lock lease lost after commit");
                }
                Err(TryRecvError::Empty) => {}
            }

            if let Err(err) = locker.unlock() {
                tracing::warn!(root = %root, error = %err, "failed to release root lock");
            }
        }

        check_failed_roots(changes, &failed)
    }

    /// Push one root's commands into its rooted repository, transactionally.
    fn push_changes_to_rooted_repository(
        &self,
        repo: &Repository,
        clone: &dyn TemporaryRepository,
        root: Sha1,
        commands: &[Command],
    ) -> Result<(), RootError> {
        let tx = self.transactioner.begin(root)?;

        // The staging storer must be an openable repository before we serve
        // it to the push machinery.
        if let Err(err) = git2::Repository::open(tx.storer()) {
            let _ = tx.rollback();
            return Err(RootError::OpenStorer(err));
        }

        let serve = inproc::serve(tx.storer());

        if let Err(err) = clone.store_config(repo) {
            let _ = tx.rollback();
            return Err(RootError::StoreConfig(err));
        }

        let refspecs = changes_to_push_refspecs(repo.id, commands);
        if let Err(err) = clone.push(serve.url(), &refspecs) {
            let _ = tx.rollback();
            return Err(RootError::Push(err));
        }

        tx.commit().map_err(RootError::Txn)
    }

    fn db_update_failed_repository(
        &self,
        repo: &mut Repository,
        now: OffsetDateTime,
    ) -> Result<(), ArchiveError> {
        repo.updated_at = now;
        self.store.update(
            repo,
            &[
                RepositoryField::UpdatedAt,
                RepositoryField::FetchErrorAt,
                RepositoryField::References,
                RepositoryField::Status,
            ],
        )?;
        Ok(())
    }

    fn db_update_repository(
        &self,
        repo: &mut Repository,
        now: OffsetDateTime,
    ) -> Result<(), crate::store::StoreError> {
        repo.status = FetchStatus::Fetched;
        repo.fetched_at = Some(now);
        repo.last_commit_at = last_commit_time(&repo.references);
        repo.updated_at = now;
        self.store.update(
            repo,
            &[
                RepositoryField::UpdatedAt,
                RepositoryField::FetchedAt,
                RepositoryField::LastCommitAt,
                RepositoryField::Status,
                RepositoryField::References,
            ],
        )
    }

    fn notify_start(&self, job: &Job) {
        if let Some(start) = &self.notifiers.start {
            start(job);
        }
    }

    fn notify_stop(&self, job: &Job, err: Option<&ArchiveError>) {
        if let Some(stop) = &self.notifiers.stop {
            stop(job, err);
        }
    }

    fn notify_warn(&self, job: &Job, err: &ArchiveError) {
        if let Some(warn) = &self.notifiers.warn {
            warn(job, err);
        }
    }
}

/// Pick the endpoint to fetch from.
///
/// Callers must not depend on which endpoint wins; the policy is a seam for
/// health-aware selection later.
// TODO(endpoints): prefer endpoints that answered recently once fetch
// telemetry is persisted.
pub fn select_endpoint(endpoints: &[String]) -> Result<&str, ArchiveError> {
    endpoints
        .first()
        .map(String::as_str)
        .ok_or(ArchiveError::EndpointsEmpty)
}

/// Render one root's commands as push refspecs.
///
/// Destinations are namespaced by repository id, partitioning the rooted
/// repository's reference space across every upstream that shares the root.
pub fn changes_to_push_refspecs(id: RepositoryId, commands: &[Command]) -> Vec<RefSpec> {
    commands
        .iter()
        .map(|command| match command {
            Command::Create { new } | Command::Update { new, .. } => {
                RefSpec::force(&new.name, &format!("{}/{}", new.name, id))
            }
            Command::Delete { old } => RefSpec::delete(&format!("{}/{}", old.name, id)),
        })
        .collect()
}

/// Fold one root's executed commands into the reference list.
///
/// Deletes and updates only apply when the stored reference still belongs to
/// the root the command was bucketed under; a mismatch means the stored side
/// moved on and the command's view is stale.
pub fn update_repository_references(
    old_refs: &[Reference],
    commands: &[Command],
    _root: Sha1,
) -> Vec<Reference> {
    let mut by_name: HashMap<String, Reference> = refs_by_name(old_refs);

    for command in commands {
        match command {
            Command::Delete { old } => {
                if let Some(existing) = by_name.get(&old.name)
                    && existing.init == old.init
                {
                    by_name.remove(&old.name);
                }
            }
            Command::Create { new } => {
                by_name.insert(new.name.clone(), new.clone());
            }
            Command::Update { old, new } => {
                if let Some(existing) = by_name.get(&new.name)
                    && existing.init == old.init
                {
                    by_name.insert(new.name.clone(), new.clone());
                }
            }
        }
    }

    by_name.into_values().collect()
}

fn check_failed_roots(changes: &Changes, failed: &[Sha1]) -> Result<(), ArchiveError> {
    if failed.is_empty() {
        return Ok(());
    }

    let roots = failed
        .iter()
        .map(Sha1::to_hex)
        .collect::<Vec<_>>()
        .join(", ");
    Err(ArchiveError::ArchivingRoots {
        failed: failed.len(),
        total: changes.len(),
        roots,
    })
}
