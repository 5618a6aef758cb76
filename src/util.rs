use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use regex::Regex;
use semver::Version;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use crate::modfile::{remove_if_exists, ROOT_MOD_FILE};

/// Module file of record and staging paths for one tool version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFilePaths {
    pub out: PathBuf,
    pub tmp: PathBuf,
    pub tmp_empty: PathBuf,
}

/// Paths for array index `index` of tool `name`. Index 0 has no number.
pub fn mod_file_paths(mod_dir: &Path, name: &str, index: usize) -> ModFilePaths {
    let stem = if index == 0 {
        name.to_string()
    } else {
        format!("{}.{}", name, index)
    };
    ModFilePaths {
        out: mod_dir.join(format!("{}.mod", stem)),
        tmp: mod_dir.join(format!("{}.tmp.mod", stem)),
        tmp_empty: mod_dir.join(format!("{}-e.tmp.mod", stem)),
    }
}

/// Splits a module file name into tool name and array index.
pub fn name_from_mod_file(path: &Path) -> Option<(String, usize)> {
    let stem = path.file_name()?.to_str()?.strip_suffix(".mod")?;
    if let Some((name, idx)) = stem.rsplit_once('.') {
        if let Ok(idx) = idx.parse::<usize>() {
            return Some((name.to_string(), idx));
        }
    }
    Some((stem.to_string(), 0))
}

/// Existing module files of a tool, ordered by array index.
pub fn existing_mod_files(mod_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    if !mod_dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = Regex::new(&format!(r"^{}(\.[0-9]+)?\.mod$", regex::escape(name)))?;
    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    for entry in WalkDir::new(mod_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy();
        if !entry.file_type().is_file() || !pattern.is_match(&file_name) {
            continue;
        }
        if let Some((_, idx)) = name_from_mod_file(entry.path()) {
            found.push((idx, entry.path().to_path_buf()));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// Removes every module file of a tool, plus leftovers sharing its stem.
/// Built binaries are never touched.
pub fn remove_mod_files(mod_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let pattern = Regex::new(&format!(r"^{}(\.[0-9]+)?\.(mod|sum)$", regex::escape(name)))?;
    let mut removed = Vec::new();
    for entry in WalkDir::new(mod_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && pattern.is_match(&entry.file_name().to_string_lossy()) {
            remove_if_exists(entry.path())?;
            removed.push(entry.path().to_path_buf());
        }
    }
    Ok(removed)
}

/// Removes `*.sum` and `*.tmp.*` files left behind by a previous run.
pub fn clean_tmp_files(mod_dir: &Path) -> Result<()> {
    if !mod_dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(mod_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && (name.ends_with(".sum") || name.contains(".tmp.")) {
            remove_if_exists(entry.path())?;
        }
    }
    Ok(())
}

const ROOT_MOD_CONTENT: &str = "module _ // Fake go.mod auto-created by 'binpin' for go -modfile compatibility with non-Go projects. Commit this file, together with other .mod files.\n";

const GITIGNORE: &str = "
# Ignore everything
*

# But not these files:
!.gitignore
!*.mod
!README.md

*tmp.mod
";

fn readme(mod_dir: &Path) -> String {
    format!(
        "# Project Development Dependencies.

This directory stores Go modules with pinned buildable packages used within this repository, managed by binpin.

* Run `binpin get` to install all tools having their own module file in this directory.
* Run `binpin get <tool>` to install <tool> that has its own module file in this directory.
* Run `binpin list` to see pinned tools and their versions.
* Each `{dir}/<tool>.mod` pins exactly one package; `{dir}/<tool>.<n>.mod` pins additional versions of it.

## Requirements

* Go 1.14+
",
        dir = mod_dir.display()
    )
}

/// Creates the pin directory if needed and (re)writes its root module file,
/// README and gitignore.
pub fn ensure_mod_dir(mod_dir: &Path) -> Result<()> {
    if !mod_dir.exists() {
        info!("binpin not used here before, creating directory for pinned modules at {}", mod_dir.display());
        fs::create_dir_all(mod_dir).with_context(|| format!("create pin dir {}", mod_dir.display()))?;
    }
    atomic_write(&mod_dir.join(ROOT_MOD_FILE), ROOT_MOD_CONTENT)?;
    atomic_write(&mod_dir.join("README.md"), &readme(mod_dir))?;
    atomic_write(&mod_dir.join(".gitignore"), GITIGNORE)
}

/// Writes a file through a temporary sibling and a rename.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent).with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path).with_context(|| format!("persist {}", path.display()))?;
    debug!(file = %path.display(), "written");
    Ok(())
}

/// Compares versions by semantic versioning when both parse, lexically otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| Version::parse(v.strip_prefix('v').unwrap_or(v)).ok();
    match (parse(a), parse(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn test_mod_file_paths() {
        let p = mod_file_paths(Path::new(".binpin"), "tool", 0);
        assert_eq!(p.out, PathBuf::from(".binpin/tool.mod"));
        assert_eq!(p.tmp, PathBuf::from(".binpin/tool.tmp.mod"));
        assert_eq!(p.tmp_empty, PathBuf::from(".binpin/tool-e.tmp.mod"));
        let p = mod_file_paths(Path::new(".binpin"), "tool", 2);
        assert_eq!(p.out, PathBuf::from(".binpin/tool.2.mod"));
        assert_eq!(p.tmp_empty, PathBuf::from(".binpin/tool.2-e.tmp.mod"));
    }

    #[test]
    fn test_name_from_mod_file() {
        assert_eq!(name_from_mod_file(Path::new("a/tool.mod")), Some(("tool".to_string(), 0)));
        assert_eq!(name_from_mod_file(Path::new("a/tool.12.mod")), Some(("tool".to_string(), 12)));
        assert_eq!(name_from_mod_file(Path::new("a/my.tool.mod")), Some(("my.tool".to_string(), 0)));
        assert_eq!(name_from_mod_file(Path::new("a/README.md")), None);
    }

    #[test]
    fn test_existing_mod_files_in_index_order() {
        let dir = tempdir().unwrap();
        for f in ["tool.10.mod", "tool.2.mod", "tool.mod", "tool.1.mod", "tooling.mod", "tool.tmp.mod"] {
            touch(dir.path(), f);
        }
        let got: Vec<_> = existing_mod_files(dir.path(), "tool")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(got, vec!["tool.mod", "tool.1.mod", "tool.2.mod", "tool.10.mod"]);
        assert!(existing_mod_files(&dir.path().join("missing"), "tool").unwrap().is_empty());
    }

    #[test]
    fn test_clean_tmp_files() {
        let dir = tempdir().unwrap();
        for f in ["tool.mod", "tool.sum", "tool.tmp.mod", "tool-e.tmp.mod", "tool.1.tmp.sum", "README.md"] {
            touch(dir.path(), f);
        }
        clean_tmp_files(dir.path()).unwrap();
        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left, vec!["README.md", "tool.mod"]);
    }

    #[test]
    fn test_ensure_mod_dir_creates_layout() {
        let dir = tempdir().unwrap();
        let mod_dir = dir.path().join(".binpin");
        ensure_mod_dir(&mod_dir).unwrap();
        assert!(mod_dir.join(ROOT_MOD_FILE).exists());
        assert!(mod_dir.join("README.md").exists());
        let gitignore = fs::read_to_string(mod_dir.join(".gitignore")).unwrap();
        assert!(gitignore.contains("!*.mod"));
        // Idempotent.
        ensure_mod_dir(&mod_dir).unwrap();
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("v1.10.0", "v1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("v1.0.0-rc.1", "v1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("abc", "abd"), Ordering::Less);
    }
}
