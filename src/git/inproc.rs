//! In-process push loopback.
//!
//! The push machinery wants a URL; a rooted transaction hands us a staging
//! location on disk. This registry maps short-lived synthetic URLs to those
//! locations: serve before the push, drop the handle after. The same pattern
//! test loopbacks use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use uuid::Uuid;

pub const SCHEME: &str = "inproc://";

fn registry() -> &'static Mutex<HashMap<String, PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A served storer location. Unregisters on drop.
pub struct ServeHandle {
    url: String,
}

impl ServeHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ServeHandle {
    fn drop(&mut self) {
        registry()
            .lock()
            .expect("inproc registry poisoned")
            .remove(&self.url);
    }
}

/// Register `path` under a fresh synthetic URL.
pub fn serve(path: &Path) -> ServeHandle {
    let url = format!("{}{}", SCHEME, Uuid::new_v4().simple());
    registry()
        .lock()
        .expect("inproc registry poisoned")
        .insert(url.clone(), path.to_path_buf());
    ServeHandle { url }
}

/// Resolve a synthetic URL back to its storer location. `None` when `url`
/// does not use the inproc scheme or is no longer served.
pub fn resolve(url: &str) -> Option<PathBuf> {
    if !url.starts_with(SCHEME) {
        return None;
    }
    registry()
        .lock()
        .expect("inproc registry poisoned")
        .get(url)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_resolve_round_trip() {
        let handle = serve(Path::new("/tmp/rooted-staging"));
        assert!(handle.url().starts_with(SCHEME));
        assert_eq!(
            resolve(handle.url()),
            Some(PathBuf::from("/tmp/rooted-staging"))
        );
    }

    #[test]
    fn dropping_the_handle_unregisters() {
        let url = {
            let handle = serve(Path::new("/tmp/rooted-staging"));
            handle.url().to_string()
        };
        assert_eq!(resolve(&url), None);
    }

    #[test]
    fn foreign_urls_do_not_resolve() {
        assert_eq!(resolve("https://example.com/x.git"), None);
    }

    #[test]
    fn concurrent_serves_get_distinct_urls() {
        let a = serve(Path::new("/tmp/a"));
        let b = serve(Path::new("/tmp/b"));
        assert_ne!(a.url(), b.url());
        assert_eq!(resolve(a.url()), Some(PathBuf::from("/tmp/a")));
        assert_eq!(resolve(b.url()), Some(PathBuf::from("/tmp/b")));
    }
}
