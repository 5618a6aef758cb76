//! Lookups in the local Go module download cache.
//!
//! Used when the toolchain cannot resolve a package by itself: the cache is
//! probed directly for a module that may contain the package.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use tracing::debug;
use walkdir::WalkDir;
use crate::error::BinpinError;
use crate::package::{escape_path, is_tagged_version, Module, Package};
use crate::toolchain::UpdatePolicy;

/// Length of the revision suffix of a pseudo-version.
const REVISION_PREFIX_LEN: usize = 12;

/// Module paths shorter than this many elements are never probed.
const MIN_MODULE_ELEMS: usize = 3;

/// The `cache/download` tree of a Go module cache.
#[derive(Debug, Clone)]
pub struct ModCache {
    download_dir: PathBuf,
}

impl ModCache {
    pub fn new<P: AsRef<Path>>(mod_cache: P) -> Self {
        ModCache { download_dir: mod_cache.as_ref().join("cache").join("download") }
    }

    /// Metadata directory (`.../@v`) of a module path.
    fn meta_dir(&self, module_path: &str) -> PathBuf {
        self.download_dir.join(escape_path(module_path)).join("@v")
    }

    /// Finds a cached module containing `target`'s package and returns the target
    /// re-based onto it.
    ///
    /// The split between module path and package path is unknown, so candidate
    /// module paths are probed from the full package path down, longest first.
    ///
    /// # Errors
    ///
    /// [`BinpinError::NoCachedModule`] when no candidate matches.
    pub fn resolve(&self, target: &Package, update: UpdatePolicy) -> Result<Package> {
        let full = target.path();
        for module_path in candidate_module_paths(&full) {
            let meta_dir = self.meta_dir(module_path);
            if !meta_dir.is_dir() {
                debug!(dir = %meta_dir.display(), "no cached metadata");
                continue;
            }
            debug!(dir = %meta_dir.display(), "found cached metadata");

            if let Some(version) = self.match_version(&meta_dir, &target.module.version, update)? {
                let mut resolved = target.clone();
                resolved.rebase(Module::new(module_path, version));
                return Ok(resolved);
            }
        }
        Err(BinpinError::NoCachedModule(full).into())
    }

    fn match_version(&self, meta_dir: &Path, version: &str, update: UpdatePolicy) -> Result<Option<String>> {
        // No version pinned or update requested: take the latest known one.
        if update.is_update() || version.is_empty() {
            let list = meta_dir.join("list");
            return latest_version(&list)
                .with_context(|| format!("get latest version from {}", list.display()))
                .map(Some);
        }

        if is_tagged_version(version) {
            let info = meta_dir.join(format!("{}.info", version));
            if info.is_file() {
                return Ok(Some(version.to_string()));
            }
            debug!(file = %info.display(), "version not cached, looking for a different module");
            return Ok(None);
        }

        let revision = version.get(..REVISION_PREFIX_LEN).unwrap_or(version);
        for entry in WalkDir::new(meta_dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let Some(pseudo) = name.strip_suffix(".info") else {
                continue;
            };
            let rev = pseudo.rsplit('-').next().unwrap_or_default();
            if rev.len() == REVISION_PREFIX_LEN && rev.starts_with(revision) {
                return Ok(Some(pseudo.to_string()));
            }
        }
        debug!(dir = %meta_dir.display(), revision, "revision not cached, looking for a different module");
        Ok(None)
    }
}

/// Module path candidates for a package path, longest first, down to
/// [`MIN_MODULE_ELEMS`] elements.
pub fn candidate_module_paths(package_path: &str) -> impl Iterator<Item = &str> {
    let path = package_path.trim_end_matches('/');
    std::iter::successors(Some(path), |p| {
        let p: &str = *p;
        p.rsplit_once('/').map(|(head, _)| head)
    })
    .take_while(|p| p.split('/').count() >= MIN_MODULE_ELEMS)
}

/// Last line of a cache version list. The cache keeps the list sorted.
fn latest_version(list_file: &Path) -> Result<String> {
    let content = fs::read_to_string(list_file)?;
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("empty file"))
}

/// Location of a module's own `go.mod` after the toolchain downloaded and
/// extracted it under `gopath`.
pub fn extracted_mod_file(gopath: &Path, module: &Module) -> PathBuf {
    gopath
        .join("pkg")
        .join("mod")
        .join(escape_path(&module.to_string()))
        .join("go.mod")
}
