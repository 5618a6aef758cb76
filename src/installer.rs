use std::fs;
use std::path::PathBuf;
use anyhow::{Context, Result};
use tracing::{debug, info};
use crate::error::BinpinError;
use crate::global::cache::ModCache;
use crate::global::utils::ToolPaths;
use crate::modfile::{ModFile, ROOT_MOD_FILE};
use crate::package::{is_tagged_version, Package};
use crate::resolve::Resolver;
use crate::shims::create_shim;
use crate::syntax::Replace;
use crate::toolchain::{ModContext, Toolchain, UpdatePolicy};
use crate::util::{clean_tmp_files, mod_file_paths, ModFilePaths};

/// Rejects tool names that cannot be routed to a module file.
pub fn validate_target_name(name: &str) -> Result<()> {
    if name == "cmd" || Some(name) == ROOT_MOD_FILE.strip_suffix(".mod") {
        return Err(BinpinError::ReservedName(name.to_string()).into());
    }
    Ok(())
}

/// Pins and builds one version of one tool.
pub struct Installer<'a> {
    toolchain: &'a dyn Toolchain,
    paths: &'a ToolPaths,
    update: UpdatePolicy,
    link: bool,
}

impl<'a> Installer<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, paths: &'a ToolPaths, update: UpdatePolicy, link: bool) -> Self {
        Installer { toolchain, paths, update, link }
    }

    /// Pins `target` as array entry `index` of tool `name` and builds it.
    ///
    /// Work happens on a staged copy of the tool's module file. The module file of
    /// record is only replaced, by a rename, once the binary was built; any
    /// earlier failure leaves it untouched.
    pub fn install(&self, index: usize, name: &str, target: Package) -> Result<PathBuf> {
        validate_target_name(name)?;
        debug!(target = %target, module = %target.module.path, index, "getting");

        let files = mod_file_paths(&self.paths.mod_dir, name, index);
        let mut target = target;
        let mut replaces: Vec<Replace> = Vec::new();

        let fully_specified = !target.module.path.is_empty() && is_tagged_version(&target.module.version);
        if !fully_specified || self.update.is_update() {
            let resolution = self.resolve(&files, &target)?;
            target = resolution.package;
            replaces = resolution.replaces;
        }

        clean_tmp_files(&self.paths.mod_dir)?;
        let mut staged = ModFile::create_from_existing_or_new(self.toolchain, Some(&files.out), &files.tmp)
            .context("create tmp mod file")?;

        if !staged.auto_replace_disabled() && !replaces.is_empty() {
            staged.set_replace(&replaces);
        }
        // Build envs and flags are only ever set by editing the module file by hand.
        if target.build_envs.is_empty() && target.build_flags.is_empty() {
            if let Some(old) = staged.direct_package() {
                target.build_envs = old.build_envs.clone();
                target.build_flags = old.build_flags.clone();
            }
        }
        staged.set_direct_require(target.clone());
        staged.close()?;

        let bin = self.build(name, &files, &target).context("install")?;

        fs::rename(&files.tmp, &files.out)
            .with_context(|| format!("rename {} to {}", files.tmp.display(), files.out.display()))?;
        info!(tool = name, package = %target, binary = %bin.display(), "installed");
        Ok(bin)
    }

    fn resolve(&self, files: &ModFilePaths, target: &Package) -> Result<crate::resolve::Resolution> {
        let empty = ModFile::create_from_existing_or_new(self.toolchain, None, &files.tmp_empty)
            .context("create empty tmp mod file")?;
        empty.close()?;

        let resolver = Resolver::new(self.toolchain, ModCache::new(&self.paths.mod_cache), self.update);
        resolver.resolve(&files.tmp_empty, &self.paths.mod_dir, target)
    }

    /// Checks the package is a command and builds `<bin_dir>/<name>-<version>`.
    fn build(&self, name: &str, files: &ModFilePaths, pkg: &Package) -> Result<PathBuf> {
        let ctx = ModContext::new(&files.tmp, &self.paths.mod_dir);
        let package_path = pkg.path();

        let kind = self
            .toolchain
            .list_package_kind(&ctx, &pkg.build_flags, &package_path)
            .context("list")?;
        if !kind.trim_end().ends_with("main") {
            return Err(BinpinError::NotInstallable { package: package_path, kind }.into());
        }

        fs::create_dir_all(&self.paths.bin_dir)
            .with_context(|| format!("create bin dir {}", self.paths.bin_dir.display()))?;
        let bin = self.paths.bin_dir.join(format!(
            "{}-{}{}",
            name,
            pkg.module.version,
            std::env::consts::EXE_SUFFIX
        ));
        self.toolchain
            .build(&ctx, &package_path, &bin, &pkg.build_flags, &pkg.build_envs)
            .context("build versioned")?;

        if self.link {
            let link = self.paths.bin_dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
            create_shim(&bin, &link).context("link")?;
        }
        Ok(bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        for name in ["cmd", "go"] {
            let err = validate_target_name(name).unwrap_err();
            assert!(matches!(err.downcast_ref::<BinpinError>(), Some(BinpinError::ReservedName(_))));
        }
        validate_target_name("golangci-lint").unwrap();
    }
}
