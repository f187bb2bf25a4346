//! Worker pool adapter.
//!
//! Jobs arrive on a channel; each worker thread builds a fresh archiver per
//! job, bound to a fresh lock session, and runs it. Notifier hooks are
//! lifted to include the worker context so operators can tell workers apart.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::lock::{LockService, SessionConfig};
use crate::store::RepositoryStore;
use crate::txn::RootedTransactioner;

use super::archiver::{Archiver, Job, Notifiers};
use super::cloner::TemporaryCloner;
use super::error::ArchiveError;

/// Identifies the worker a notification came from.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub worker: usize,
}

type PoolStartFn = Arc<dyn Fn(&WorkerContext, &Job) + Send + Sync>;
type PoolStopFn = Arc<dyn Fn(&WorkerContext, &Job, Option<&ArchiveError>) + Send + Sync>;
type PoolWarnFn = Arc<dyn Fn(&WorkerContext, &Job, &ArchiveError) + Send + Sync>;

/// Notifier hooks with worker context attached.
#[derive(Clone, Default)]
pub struct PoolNotifiers {
    pub start: Option<PoolStartFn>,
    pub stop: Option<PoolStopFn>,
    pub warn: Option<PoolWarnFn>,
}

/// The shared collaborators every job needs.
#[derive(Clone)]
pub struct ArchiverServices {
    pub store: Arc<dyn RepositoryStore>,
    pub transactioner: Arc<dyn RootedTransactioner>,
    pub cloner: Arc<dyn TemporaryCloner>,
    pub locks: Arc<dyn LockService>,
}

pub struct WorkerPool {
    jobs_tx: Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads consuming archive jobs.
    pub fn spawn(
        services: ArchiverServices,
        session_cfg: SessionConfig,
        workers: usize,
        notifiers: PoolNotifiers,
    ) -> Self {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();

        let handles = (0..workers)
            .map(|worker| {
                let services = services.clone();
                let notifiers = notifiers.clone();
                let jobs_rx = jobs_rx.clone();
                std::thread::spawn(move || {
                    run_worker_loop(worker, services, session_cfg, notifiers, jobs_rx)
                })
            })
            .collect();

        Self { jobs_tx, handles }
    }

    /// Channel for submitting jobs.
    pub fn sender(&self) -> Sender<Job> {
        self.jobs_tx.clone()
    }

    /// Stop accepting jobs and wait for in-flight ones to finish.
    pub fn join(self) {
        drop(self.jobs_tx);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_worker_loop(
    worker: usize,
    services: ArchiverServices,
    session_cfg: SessionConfig,
    notifiers: PoolNotifiers,
    jobs_rx: Receiver<Job>,
) {
    let ctx = WorkerContext { worker };

    for job in jobs_rx {
        let session = match services.locks.new_session(session_cfg) {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(worker, repository = %job.repository_id, error = %err,
                    "could not open lock session; dropping job");
                continue;
            }
        };

        let mut archiver = Archiver::new(
            Arc::clone(&services.store),
            Arc::clone(&services.transactioner),
            Arc::clone(&services.cloner),
            session,
        );
        archiver.notifiers = bind_notifiers(&notifiers, ctx.clone());

        if let Err(err) = archiver.archive(&job) {
            tracing::error!(worker, repository = %job.repository_id, error = %err,
                "archive job failed");
        }
    }
}

fn bind_notifiers(pool: &PoolNotifiers, ctx: WorkerContext) -> Notifiers {
    let mut notifiers = Notifiers::default();

    if let Some(start) = pool.start.clone() {
        let ctx = ctx.clone();
        notifiers.start = Some(Box::new(move |job| start(&ctx, job)));
    }
    if let Some(stop) = pool.stop.clone() {
        let ctx = ctx.clone();
        notifiers.stop = Some(Box::new(move |job, err| stop(&ctx, job, err)));
    }
    if let Some(warn) = pool.warn.clone() {
        notifiers.warn = Some(Box::new(move |job, err| warn(&ctx, job, err)));
    }

    notifiers
}
