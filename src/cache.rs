//! Build-state caches for incremental builds.
//!
//! Two pieces of state persist across runs under `.cache/`:
//!
//! - **Slug cache** (`page-slugs.json`): the set of document slugs seen by
//!   the last full build, as a sorted JSON array. The next full build diffs
//!   its own slug set against this one to find documents that disappeared,
//!   and prunes their output directories. Post slugs carry a `posts/`
//!   prefix: it keeps them out of the top-level namespace and marks them as
//!   append-only — stale posts are never auto-pruned.
//!
//! - **Content fingerprints**: one file per source path holding the SHA-256
//!   hex digest of the file's bytes, named by the relative path with a
//!   fixed `__` separator substitution (so keys are identical across host
//!   path-separator conventions). Content-based rather than mtime-based so
//!   fingerprints survive `git checkout`. Advisory only: a single-file
//!   build logs whether the file changed but rebuilds either way.
//!
//! Both caches degrade to empty on absence or corruption — they are
//! optimization state, never a source of truth, and deleting `.cache/` is
//! always safe.

use crate::config::SitePaths;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

/// Persisted set of document slugs from the previous full build.
pub struct SlugCache;

impl SlugCache {
    /// Load the previous build's slug set. Absent, unreadable or malformed
    /// cache files all yield the empty set — never an error.
    pub fn load(paths: &SitePaths) -> BTreeSet<String> {
        let Ok(raw) = fs::read_to_string(paths.slug_cache()) else {
            return BTreeSet::new();
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(slugs) => slugs.into_iter().collect(),
            Err(e) => {
                eprintln!("Warning: ignoring malformed slug cache: {e}");
                BTreeSet::new()
            }
        }
    }

    /// Persist the current build's slug set, superseding the previous one.
    /// The BTreeSet iterates sorted, so the written array is deterministic.
    pub fn save(paths: &SitePaths, slugs: &BTreeSet<String>) -> io::Result<()> {
        fs::create_dir_all(paths.cache_dir())?;
        let json = serde_json::to_string(&slugs.iter().collect::<Vec<_>>())?;
        fs::write(paths.slug_cache(), json)
    }

    /// Drop the persisted set entirely, forcing the next full build to
    /// recompute from scratch (used by `--clean` and single-file deletion).
    pub fn invalidate(paths: &SitePaths) -> io::Result<()> {
        match fs::remove_file(paths.slug_cache()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Check one source file against its persisted content fingerprint.
///
/// Returns whether the file differs from (or was absent from) the cache.
/// The stored digest is refreshed whenever it is stale, so two consecutive
/// calls on an unchanged file report `true` then `false`.
pub fn fingerprint_changed(path: &Path, paths: &SitePaths) -> io::Result<bool> {
    fs::create_dir_all(paths.cache_dir())?;

    let digest = hash_file(path)?;
    let cache_file = paths.cache_dir().join(fingerprint_key(path, paths));

    if let Ok(cached) = fs::read_to_string(&cache_file)
        && cached.trim() == digest
    {
        return Ok(false);
    }

    fs::write(&cache_file, &digest)?;
    Ok(true)
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Filesystem-safe fingerprint filename for a source path.
///
/// The path relative to the site root, components joined with `__` — a
/// fixed substitution independent of the host separator — plus `.hash`.
fn fingerprint_key(path: &Path, paths: &SitePaths) -> String {
    let rel = path.strip_prefix(paths.root()).unwrap_or(path);
    let mut key = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("__");
    key.push_str(".hash");
    key
}
