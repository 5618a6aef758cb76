//! The `get` flow: single targets, array installs, renames, uninstalls and
//! the bulk refresh of every pinned tool.

use std::fs;
use std::path::PathBuf;
use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};
use crate::error::BinpinError;
use crate::global::utils::ToolPaths;
use crate::installer::Installer;
use crate::list::list_pinned;
use crate::modfile::direct_package_of;
use crate::package::{Module, Package};
use crate::target::{parse_target, NONE_VERSION};
use crate::toolchain::{Toolchain, UpdatePolicy};
use crate::util::{clean_tmp_files, ensure_mod_dir, existing_mod_files, name_from_mod_file, remove_mod_files};

/// Options of one `get` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetConfig {
    pub update: UpdatePolicy,
    /// Install under this name instead of the one derived from the target.
    pub name: Option<String>,
    /// Move an installed tool to this name.
    pub rename: Option<String>,
    /// Point `<bin_dir>/<name>` at the built binary.
    pub link: bool,
}

/// Runs `get` for `raw_target`, or refreshes every pinned tool when it is empty.
pub fn get(toolchain: &dyn Toolchain, paths: &ToolPaths, cfg: &GetConfig, raw_target: &str) -> Result<()> {
    clean_tmp_files(&paths.mod_dir)?;
    ensure_mod_dir(&paths.mod_dir).context("ensure mod dir")?;

    if raw_target.is_empty() {
        return get_all(toolchain, paths, cfg);
    }

    let target = parse_target(raw_target).with_context(|| format!("parse {}", raw_target))?;
    let has_versions = !target.has_no_version();
    if cfg.update.is_update() && has_versions {
        bail!(
            "-u specified; upgrade cannot take version arguments (string after @), got {:?}",
            target.versions
        );
    }

    let installer = Installer::new(toolchain, paths, cfg.update, cfg.link);

    if let Some(new_name) = &cfg.rename {
        if !target.package_path.is_empty() {
            bail!("-r rename has to reference installed tool by name not path, got: {}", target.package_path);
        }
        if has_versions {
            bail!("-r rename cannot take version arguments (string after @), got {:?}", target.versions);
        }
        validate_new_name(&target.versions, &target.name, new_name).context("-r")?;
        return rename(&installer, paths, &target.name, new_name);
    }

    let name = match &cfg.name {
        Some(new_name) => {
            validate_new_name(&target.versions, &target.name, new_name).context("-n")?;
            new_name.clone()
        }
        None => target.name.clone(),
    };
    let existing = existing_mod_files(&paths.mod_dir, &name)
        .with_context(|| format!("existing mod files for {}", name))?;

    if target.is_none() {
        if !target.package_path.is_empty() {
            bail!("cannot delete tool by full path. Use just {}@none name instead", name);
        }
        if existing.is_empty() {
            bail!("nothing to delete, tool {} is not installed", name);
        }
        // Binaries stay where they are.
        let removed = remove_mod_files(&paths.mod_dir, &name)?;
        info!(tool = %name, files = removed.len(), "unpinned");
        return Ok(());
    }

    let mut versions = target.versions.clone();
    if target.has_no_version() && existing.len() > 1 && !cfg.update.is_update() {
        // Re-get every pinned array version at once.
        versions = vec![String::new(); existing.len()];
    }

    let mut package_path = target.package_path.clone();
    let mut targets: Vec<Package> = Vec::with_capacity(versions.len());
    for (i, version) in versions.iter().enumerate() {
        let mut pkg = Package::unresolved(&package_path, version);
        if let Some(file) = existing.get(i) {
            let direct = direct_package_of(file).with_context(|| {
                format!(
                    "found unparsable mod file {}. Uninstall it first via get {}@none or fix it manually",
                    file.display(),
                    name
                )
            })?;
            match direct {
                Some(direct) => {
                    if !pkg.path().is_empty() && pkg.path() != direct.path() {
                        if target.package_path.is_empty() {
                            bail!(
                                "found array mod file {} that has different package path {:?} than previous in array {:?}. Manual edit? Uninstall existing tool using `{}@none` or use `-n` flag to choose different name",
                                file.display(),
                                direct.path(),
                                pkg.path(),
                                name
                            );
                        }
                        bail!(
                            "found mod file {} that has different package path {:?} than given {:?}. Uninstall existing tool using `{}@none` or use `-n` flag to choose different name",
                            file.display(),
                            direct.path(),
                            pkg.path(),
                            name
                        );
                    }
                    let version = if version.is_empty() && !cfg.update.is_update() {
                        direct.module.version.clone()
                    } else {
                        version.clone()
                    };
                    pkg.module = Module::new(direct.module.path.clone(), version);
                    pkg.rel_path = direct.rel_path.clone();
                    package_path = pkg.path();
                }
                None if pkg.path().is_empty() => bail!(
                    "failed to install tool {} found empty mod file {}; Use full path to install tool again",
                    name,
                    file.display()
                ),
                None => {}
            }
        }
        if pkg.path().is_empty() {
            bail!(
                "tool referenced by name {} that was never installed before; Use full path to install a tool",
                target.name
            );
        }
        targets.push(pkg);
    }

    for (i, pkg) in targets.into_iter().enumerate() {
        let label = pkg.to_string();
        installer
            .install(i, &name, pkg)
            .with_context(|| format!("{}.mod: getting {}", name, label))?;
    }
    remove_unused_array_files(paths, &name, versions.len())
}

/// Re-installs every pinned tool at the versions its module files record.
fn get_all(toolchain: &dyn Toolchain, paths: &ToolPaths, cfg: &GetConfig) -> Result<()> {
    if cfg.name.is_some() {
        bail!("name cannot be specified if no target was given");
    }
    if cfg.rename.is_some() {
        bail!("rename cannot be specified if no target was given");
    }

    let installer = Installer::new(toolchain, paths, cfg.update, cfg.link);
    let tools = list_pinned(&paths.mod_dir, false)?;

    // A sibling that could not be read would be recreated by the install.
    for tool in &tools {
        let unreadable: Vec<PathBuf> = existing_mod_files(&paths.mod_dir, &tool.name)?
            .into_iter()
            .filter(|f| {
                let file_name = f.file_name().map(|n| n.to_string_lossy().to_string());
                !tool.versions.iter().any(|v| Some(&v.mod_file) == file_name.as_ref())
            })
            .collect();
        if !unreadable.is_empty() {
            bail!(
                "found unparsable mod files {:?} of tool {}. Uninstall it first via get {}@none or fix them manually",
                unreadable,
                tool.name,
                tool.name
            );
        }
    }

    debug!(tools = tools.len(), "getting all pinned tools");
    for tool in &tools {
        for (i, pkg) in tool.to_packages() {
            let label = pkg.to_string();
            installer
                .install(i, &tool.name, pkg)
                .with_context(|| format!("{}: getting {}", i, label))?;
        }
    }
    Ok(())
}

fn rename(installer: &Installer<'_>, paths: &ToolPaths, old: &str, new: &str) -> Result<()> {
    let taken = existing_mod_files(&paths.mod_dir, new).with_context(|| format!("existing mod files for {}", new))?;
    if !taken.is_empty() {
        return Err(BinpinError::NameCollision { name: new.to_string(), existing: taken })
            .context("found existing installed binaries under the name you want to rename to; remove them or use a different name");
    }

    let existing = existing_mod_files(&paths.mod_dir, old).with_context(|| format!("existing mod files for {}", old))?;
    if existing.is_empty() {
        bail!("nothing to rename, tool {} not installed", old);
    }

    let mut targets = Vec::with_capacity(existing.len());
    for file in &existing {
        let direct = direct_package_of(file).with_context(|| {
            format!(
                "found unparsable mod file {}. Uninstall it first via get {}@none or fix it manually",
                file.display(),
                old
            )
        })?;
        let direct = direct.ok_or_else(|| {
            anyhow!(
                "failed to rename tool {} to {} name; found empty mod file {}; Use full path to install tool again",
                old,
                new,
                file.display()
            )
        })?;
        targets.push(direct);
    }

    for (i, pkg) in targets.into_iter().enumerate() {
        let label = pkg.to_string();
        installer
            .install(i, new, pkg)
            .with_context(|| format!("{}.mod: getting {}", new, label))?;
    }
    remove_mod_files(&paths.mod_dir, old)?;
    info!(from = old, to = new, "renamed");
    Ok(())
}

fn validate_new_name(versions: &[String], old: &str, new: &str) -> Result<()> {
    if new == old {
        return Err(BinpinError::NameCollision { name: new.to_string(), existing: Vec::new() })
            .context("cannot be the same as module name");
    }
    if versions.first().map(String::as_str) == Some(NONE_VERSION) {
        bail!("cannot use with @none logic");
    }
    Ok(())
}

/// Drops array module files whose index is past the last requested version.
fn remove_unused_array_files(paths: &ToolPaths, name: &str, keep: usize) -> Result<()> {
    let stale: Vec<PathBuf> = existing_mod_files(&paths.mod_dir, name)?
        .into_iter()
        .filter(|f| name_from_mod_file(f).is_some_and(|(_, idx)| idx >= keep))
        .collect();
    for file in stale {
        fs::remove_file(&file).with_context(|| format!("remove {}", file.display()))?;
        debug!(file = %file.display(), "removed unused array mod file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_new_name() {
        let v = vec![String::new()];
        let err = validate_new_name(&v, "tool", "tool").unwrap_err();
        assert!(matches!(err.downcast_ref::<BinpinError>(), Some(BinpinError::NameCollision { .. })));
        assert!(validate_new_name(&[NONE_VERSION.to_string()], "tool", "other").is_err());
        validate_new_name(&v, "tool", "other").unwrap();
    }
}
