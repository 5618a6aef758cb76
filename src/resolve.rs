//! Resolution of a requested package into a concrete module and version.

use std::path::Path;
use anyhow::{anyhow, Context, Result};
use tracing::debug;
use crate::error::BinpinError;
use crate::global::cache::{extracted_mod_file, ModCache};
use crate::modfile::{indirect_modules, parse_mod_file};
use crate::package::{is_incompatible_version, Package};
use crate::syntax::Replace;
use crate::toolchain::{ModContext, Toolchain, UpdatePolicy};

/// Outcome of a resolution: the concrete package and the replace directives of
/// its module, to be applied to the tool module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub package: Package,
    pub replaces: Vec<Replace>,
}

pub struct Resolver<'a> {
    toolchain: &'a dyn Toolchain,
    cache: ModCache,
    update: UpdatePolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, cache: ModCache, update: UpdatePolicy) -> Self {
        Resolver { toolchain, cache, update }
    }

    /// Resolves `target` against `empty_mod_file`, a module file with no requires.
    ///
    /// The toolchain is asked first; the module it adds as the only indirect
    /// require is the answer. When it fails, or adds several modules none of
    /// which is the one asked for, the local module cache is probed instead.
    pub fn resolve(&self, empty_mod_file: &Path, dir: &Path, target: &Package) -> Result<Resolution> {
        let ctx = ModContext::new(empty_mod_file, dir);
        let package = match self.toolchain.resolve_dependency(&ctx, self.update, &target.to_string()) {
            Ok(output) => match self.pick_indirect(empty_mod_file, target)? {
                Some(package) => package,
                None => self.resolve_in_cache(target, anyhow!(
                    "no indirect module in {} matches {}: {}",
                    empty_mod_file.display(),
                    target,
                    output
                ))?,
            },
            Err(err) => self.resolve_in_cache(target, err)?,
        };
        debug!(package = %package, module = %package.module.path, "resolved");

        let replaces = if is_incompatible_version(&package.module.version) {
            Vec::new()
        } else {
            self.upstream_replaces(&package)?
        };
        Ok(Resolution { package, replaces })
    }

    /// Picks the resolved module out of the indirect requires the toolchain added.
    fn pick_indirect(&self, mod_file: &Path, target: &Package) -> Result<Option<Package>> {
        let mods = indirect_modules(mod_file)?;
        let chosen = match mods.as_slice() {
            [] => return Err(BinpinError::NoIndirectModule(mod_file.to_path_buf()).into()),
            [only] => Some(only.clone()),
            many if !target.module.path.is_empty() => {
                many.iter().find(|m| m.path == target.module.path).cloned()
            }
            many => {
                let full = target.path();
                many.iter().find(|m| m.path == full).cloned()
            }
        };
        Ok(chosen.map(|module| {
            let mut package = target.clone();
            package.rebase(module);
            package
        }))
    }

    fn resolve_in_cache(&self, target: &Package, toolchain_err: anyhow::Error) -> Result<Package> {
        debug!(package = %target, "toolchain resolution failed, probing module cache: {:#}", toolchain_err);
        self.cache.resolve(target, self.update).with_context(|| {
            format!("fallback to local module cache resolution failed after toolchain failure: {:#}", toolchain_err)
        })
    }

    /// Replace directives of the resolved module's own module file, if it has one.
    fn upstream_replaces(&self, package: &Package) -> Result<Vec<Replace>> {
        let gopath = self.toolchain.env_var("GOPATH").context("read GOPATH")?;
        let gopath = std::env::split_paths(&gopath)
            .find(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| BinpinError::Environment("toolchain reports empty GOPATH".to_string()))?;

        let mod_file = extracted_mod_file(&gopath, &package.module);
        if !mod_file.exists() {
            debug!(file = %mod_file.display(), "module has no module file");
            return Ok(Vec::new());
        }
        let doc = parse_mod_file(&mod_file).with_context(|| format!("parse target module file {}", mod_file.display()))?;
        Ok(doc.replaces())
    }
}
