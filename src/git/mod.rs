//! Live git plumbing: scratch clones, reference enumeration with root
//! discovery, the in-process push loopback, and the filesystem-backed rooted
//! transactioner.

pub mod cloner;
pub mod inproc;
pub mod referencer;
pub mod transactioner;

pub use cloner::GitCloner;
pub use referencer::GitReferencer;
pub use transactioner::FsTransactioner;

use crate::core::Sha1;

pub(crate) fn sha1_from_oid(oid: git2::Oid) -> Sha1 {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    Sha1::from_bytes(bytes)
}
