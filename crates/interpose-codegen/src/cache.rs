//! On-disk cache of proxy descriptions
//!
//! One JSON file per target and source fingerprint (see
//! [`crate::ExtractedContract::source_fingerprint`]):
//! `<dir>/<Target>-<fingerprint>.json`. A lookup under a new fingerprint
//! misses, and entries left behind by earlier fingerprints are pruned, so
//! any source change that affects the emitted code regenerates. Unreadable
//! entries are dropped and count as misses.

use std::fs;
use std::path::{Path, PathBuf};

use interpose_core::Fingerprint;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::synthesize::{ProxyTypeDescription, SynthesisOptions};

const EXTENSION: &str = "json";

/// Directory of cached descriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionCache {
    dir: PathBuf,
}

impl DescriptionCache {
    /// Cache rooted at `dir`; the directory is created on first store
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a target's description for one fingerprint
    pub fn entry_path(&self, target: &str, fingerprint: Fingerprint) -> PathBuf {
        self.dir.join(format!("{target}-{fingerprint}.{EXTENSION}"))
    }

    /// Cached description, if one exists for this source fingerprint and
    /// options.
    ///
    /// Entries for other fingerprints of the same target are removed, and so
    /// is this one when it does not decode.
    pub fn load(
        &self,
        target: &str,
        fingerprint: Fingerprint,
        options: &SynthesisOptions,
    ) -> Result<Option<ProxyTypeDescription>, CacheError> {
        self.prune(target, Some(fingerprint))?;
        let path = self.entry_path(target, fingerprint);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(type_name = target, fingerprint = %fingerprint.short(), "description cache miss");
                return Ok(None);
            }
            Err(error) => return Err(CacheError::io(path, error)),
        };
        let description: ProxyTypeDescription = match serde_json::from_str(&text) {
            Ok(description) => description,
            Err(error) => {
                warn!(path = %path.display(), %error, "dropping unreadable cache entry");
                fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                return Ok(None);
            }
        };
        if description.source_fingerprint != fingerprint || description.target != target {
            warn!(path = %path.display(), "cache entry does not match its file name; ignoring it");
            return Ok(None);
        }
        if description.options != *options {
            debug!(type_name = target, "cached description was built with other options");
            return Ok(None);
        }
        debug!(type_name = target, fingerprint = %fingerprint.short(), "description cache hit");
        Ok(Some(description))
    }

    /// Write a description, replacing any entry for the same fingerprint
    pub fn store(&self, description: &ProxyTypeDescription) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let path = self.entry_path(&description.target, description.source_fingerprint);
        let text = serde_json::to_string_pretty(description).map_err(|source| CacheError::Encode {
            path: path.clone(),
            source,
        })?;
        // write-then-rename so readers never see a partial file
        let partial = path.with_extension("json.partial");
        fs::write(&partial, text).map_err(|e| CacheError::io(&partial, e))?;
        fs::rename(&partial, &path).map_err(|e| CacheError::io(&path, e))?;
        debug!(path = %path.display(), "stored proxy description");
        Ok(path)
    }

    /// Remove a target's entries, keeping the one for `keep` if given.
    /// Returns the number of files removed.
    pub fn prune(&self, target: &str, keep: Option<Fingerprint>) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(CacheError::io(&self.dir, error)),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            let Some(fingerprint) = entry_fingerprint(&path, target) else {
                continue;
            };
            if keep.is_some_and(|kept| kept.to_string() == fingerprint) {
                continue;
            }
            warn!(type_name = target, stale = %fingerprint, "removing stale proxy description");
            fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }
}

// fingerprint part of `<target>-<hex>.json`, if the file belongs to `target`
fn entry_fingerprint(path: &Path, target: &str) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let fingerprint = stem.strip_prefix(target)?.strip_prefix('-')?;
    fingerprint
        .parse::<Fingerprint>()
        .is_ok()
        .then(|| fingerprint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_belong_to_one_target() {
        let fingerprint = Fingerprint::from_bytes([7; 32]);
        let cache = DescriptionCache::new("/cache");
        let path = cache.entry_path("Base", fingerprint);
        assert_eq!(entry_fingerprint(&path, "Base"), Some(fingerprint.to_string()));
        assert_eq!(entry_fingerprint(&path, "Bas"), None);
        assert_eq!(entry_fingerprint(Path::new("/cache/Base-notahash.json"), "Base"), None);
    }

    #[test]
    fn unreadable_entries_are_dropped_as_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DescriptionCache::new(dir.path());
        let fingerprint = Fingerprint::from_bytes([3; 32]);
        let path = cache.entry_path("Base", fingerprint);
        fs::write(&path, "{ truncated").unwrap();

        let loaded = cache.load("Base", fingerprint, &SynthesisOptions::default()).unwrap();
        assert_eq!(loaded, None);
        assert!(!path.exists());
    }
}
