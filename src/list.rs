use std::path::Path;
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;
use crate::modfile::{direct_package_of, ROOT_MOD_FILE};
use crate::package::{strip_module_prefix, Module, Package};
use crate::util::{compare_versions, name_from_mod_file, remove_mod_files};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedVersion {
    /// Array index taken from the module file name.
    pub index: usize,
    pub version: String,
    pub mod_file: String,
}

/// A pinned tool with all of its array versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedTool {
    pub name: String,
    pub module_path: String,
    pub package_path: String,
    /// Ordered by array index.
    pub versions: Vec<PinnedVersion>,
    pub build_envs: Vec<String>,
    pub build_flags: Vec<String>,
}

impl PinnedTool {
    /// One package per pinned version with its array index, in array order.
    pub fn to_packages(&self) -> Vec<(usize, Package)> {
        let rel_path = strip_module_prefix(&self.package_path, &self.module_path);
        self.versions
            .iter()
            .map(|v| {
                let pkg = Package {
                    module: Module::new(self.module_path.clone(), v.version.clone()),
                    rel_path: rel_path.clone(),
                    ..Default::default()
                };
                (v.index, pkg)
            })
            .collect()
    }
}

/// Lists all pinned tools of a pin directory.
///
/// Module files that cannot be read are skipped with a warning, or removed
/// together with their siblings when `remove_malformed` is set.
pub fn list_pinned(mod_dir: &Path, remove_malformed: bool) -> Result<Vec<PinnedTool>> {
    let mut files: Vec<(String, usize, String, Package)> = Vec::new();
    if mod_dir.exists() {
        for entry in WalkDir::new(mod_dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type().is_file() || file_name == ROOT_MOD_FILE || file_name.contains(".tmp.") {
                continue;
            }
            let Some((name, index)) = name_from_mod_file(entry.path()) else {
                continue;
            };

            match direct_package_of(entry.path()) {
                Ok(Some(pkg)) => files.push((name, index, file_name, pkg)),
                Ok(None) => warn!(file = %entry.path().display(), "module file has no direct package; skipping"),
                Err(err) if remove_malformed => {
                    warn!(file = %entry.path().display(), "removing malformed module file: {:#}", err);
                    remove_mod_files(mod_dir, &name)?;
                }
                Err(err) => warn!(file = %entry.path().display(), "skipping malformed module file: {:#}", err),
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));

    let mut tools: Vec<PinnedTool> = Vec::new();
    let mut first_seen: Vec<String> = Vec::new();
    for (name, _, _, _) in &files {
        if !first_seen.contains(name) {
            first_seen.push(name.clone());
        }
    }
    first_seen.sort();
    for name in first_seen {
        let mut versions = files.iter().filter(|f| f.0 == name);
        let Some((_, index, mod_file, pkg)) = versions.next() else {
            continue;
        };
        let mut tool = PinnedTool {
            name: name.clone(),
            module_path: pkg.module.path.clone(),
            package_path: pkg.path(),
            versions: vec![PinnedVersion {
                index: *index,
                version: pkg.module.version.clone(),
                mod_file: mod_file.clone(),
            }],
            build_envs: pkg.build_envs.clone(),
            build_flags: pkg.build_flags.clone(),
        };
        tool.versions.extend(versions.map(|(_, index, mod_file, pkg)| PinnedVersion {
            index: *index,
            version: pkg.module.version.clone(),
            mod_file: mod_file.clone(),
        }));
        tools.push(tool);
    }
    Ok(tools)
}

/// Renders pinned tools as a table. With `target`, only that tool is shown.
///
/// # Errors
///
/// Fails when `target` is given but not pinned.
pub fn render_table(tools: &[PinnedTool], target: Option<&str>) -> Result<String> {
    let header = ["Name", "Binary Name", "Package @ Version", "Build EnvVars", "Build Flags"];
    let mut rows: Vec<[String; 5]> = Vec::new();
    for tool in tools.iter().filter(|t| target.is_none_or(|n| n == t.name)) {
        let mut versions: Vec<&PinnedVersion> = tool.versions.iter().collect();
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        for v in versions {
            rows.push([
                tool.name.clone(),
                format!("{}-{}", tool.name, v.version),
                format!("{}@{}", tool.package_path, v.version),
                tool.build_envs.join(" "),
                tool.build_flags.join(" "),
            ]);
        }
    }
    if let Some(target) = target {
        if rows.is_empty() {
            bail!("pinned tool {} not found", target);
        }
    }

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let line = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{:<w$}", c, w = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![
        line(header),
        line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)),
    ];
    for row in &rows {
        out.push(line(row.each_ref().map(String::as_str)));
    }
    Ok(out.join("\n"))
}
