//! Named mutual-exclusion leases.
//!
//! Rooted repositories are keyed by root commit hash; at most one archiver
//! may mutate a given root at a time. A [`LockService`] hands out one
//! [`LockSession`] per job; lockers are named by the root hash they guard.
//! Leases carry a TTL and a lost-lock channel that fires if the lease is
//! taken away before it is released.
//!
//! [`LocalLockService`] is the in-process implementation used on single-host
//! deployments and in tests; a distributed backend lives behind the same
//! traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, bounded};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{Effect, Transience};

/// Per-session lease settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
        }
    }
}

pub trait LockService: Send + Sync {
    fn new_session(&self, cfg: SessionConfig) -> Result<Box<dyn LockSession>, LockError>;
}

pub trait LockSession: Send + Sync {
    fn new_locker(&self, name: &str) -> Box<dyn Locker>;
}

pub trait Locker: Send {
    /// Acquire the lease. The returned channel fires (or closes) if the
    /// lease is lost before `unlock`.
    fn lock(&mut self) -> Result<Receiver<()>, LockError>;

    fn unlock(&mut self) -> Result<(), LockError>;
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock {name} is held by another session")]
    Busy { name: String },

    #[error("lock {name} is not held by this session")]
    NotHeld { name: String },

    #[error("lock session failed: {0}")]
    Session(String),
}

impl LockError {
    pub fn transience(&self) -> Transience {
        match self {
            LockError::Busy { .. } | LockError::Session(_) => Transience::Retryable,
            LockError::NotHeld { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

struct Lease {
    holder: Uuid,
    expires_at: Instant,
    lost_tx: Sender<()>,
}

type LeaseTable = Arc<Mutex<HashMap<String, Lease>>>;

/// Process-local lock service: a shared lease table with TTL stealing.
///
/// `lock` is try-lock: a live lease held elsewhere fails with `Busy` (the
/// archiver records the root as failed and a later job retries). An expired
/// lease is stolen, and the previous holder's lost-lock channel fires.
#[derive(Clone, Default)]
pub struct LocalLockService {
    leases: LeaseTable,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for LocalLockService {
    fn new_session(&self, cfg: SessionConfig) -> Result<Box<dyn LockSession>, LockError> {
        Ok(Box::new(LocalLockSession {
            leases: Arc::clone(&self.leases),
            ttl: cfg.ttl,
        }))
    }
}

struct LocalLockSession {
    leases: LeaseTable,
    ttl: Duration,
}

impl LockSession for LocalLockSession {
    fn new_locker(&self, name: &str) -> Box<dyn Locker> {
        Box::new(LocalLocker {
            leases: Arc::clone(&self.leases),
            ttl: self.ttl,
            name: name.to_string(),
            token: Uuid::new_v4(),
        })
    }
}

struct LocalLocker {
    leases: LeaseTable,
    ttl: Duration,
    name: String,
    token: Uuid,
}

impl Locker for LocalLocker {
    fn lock(&mut self) -> Result<Receiver<()>, LockError> {
        let mut table = self.leases.lock().expect("lease table poisoned");
        let now = Instant::now();

        if let Some(lease) = table.get(&self.name) {
            if lease.expires_at > now {
                return Err(LockError::Busy {
                    name: self.name.clone(),
                });
            }
            // Expired lease: steal it and tell the previous holder.
            let _ = lease.lost_tx.send(());
        }

        let (lost_tx, lost_rx) = bounded(1);
        table.insert(
            self.name.clone(),
            Lease {
                holder: self.token,
                expires_at: now + self.ttl,
                lost_tx,
            },
        );
        Ok(lost_rx)
    }

    fn unlock(&mut self) -> Result<(), LockError> {
        let mut table = self.leases.lock().expect("lease table poisoned");
        match table.get(&self.name) {
            Some(lease) if lease.holder == self.token => {
                table.remove(&self.name);
                Ok(())
            }
            _ => Err(LockError::NotHeld {
                name: self.name.clone(),
            }),
        }
    }
}
