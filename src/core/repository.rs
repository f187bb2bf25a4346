//! Persisted upstream repository model.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Reference, RepositoryId};

/// Fetch lifecycle of an upstream repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Known but never archived.
    Pending,
    /// An archiver currently owns a job for it.
    Fetching,
    /// Last archive attempt succeeded.
    Fetched,
    /// The upstream no longer exists at any known endpoint.
    NotFound,
}

/// The persisted record of one upstream repository.
///
/// After a successful archive, `references` reflects the upstream state for
/// every root whose push landed, and the previous state for roots whose push
/// failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub endpoints: Vec<String>,
    pub status: FetchStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub fetched_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub fetch_error_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit_at: Option<OffsetDateTime>,
    pub references: Vec<Reference>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Repository {
    /// A fresh record for a repository that has never been archived.
    pub fn new(id: RepositoryId, endpoints: Vec<String>, now: OffsetDateTime) -> Self {
        Self {
            id,
            endpoints,
            status: FetchStatus::Pending,
            fetched_at: None,
            fetch_error_at: None,
            last_commit_at: None,
            references: Vec::new(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn new_record_is_pending_and_empty() {
        let now = datetime!(2024-03-01 12:00 UTC);
        let r = Repository::new(
            RepositoryId::generate(),
            vec!["https://example.com/a.git".into()],
            now,
        );
        assert_eq!(r.status, FetchStatus::Pending);
        assert!(r.references.is_empty());
        assert_eq!(r.fetched_at, None);
        assert_eq!(r.updated_at, now);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&FetchStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }

    #[test]
    fn record_round_trips_through_json() {
        let now = datetime!(2024-03-01 12:00 UTC);
        let r = Repository::new(RepositoryId::generate(), vec!["x".into()], now);
        let json = serde_json::to_string(&r).unwrap();
        let back: Repository = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
