use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::{debug, warn};
use crate::error::BinpinError;
use crate::package::{parse_package_meta, Module, Package};
use crate::syntax::{comment_text, ModDocument, Replace};
use crate::toolchain::Toolchain;

/// Comment every tool module file carries on its module line.
pub const MARKER_COMMENT: &str = "// Auto generated by binpin. DO NOT EDIT";

/// A comment containing this anywhere in a module file stops binpin from copying
/// replace directives of the pinned module.
pub const NO_REPLACE_FETCH: &str = "binpin:no_replace_fetch";

/// Root module file kept in the pin directory so `go` finds a module root.
pub const ROOT_MOD_FILE: &str = "go.mod";

/// An open tool module file.
///
/// The in-memory document holds at most one direct require: the pinned package.
/// Its relative path, build envs and build flags are encoded in the require's
/// trailing comment. Callers edit through the setters, then [`ModFile::flush`] or
/// [`ModFile::close`].
#[derive(Debug)]
pub struct ModFile {
    path: PathBuf,
    file: File,
    doc: ModDocument,
    direct: Option<Package>,
    auto_replace_disabled: bool,
}

impl ModFile {
    /// Opens an existing tool module file.
    ///
    /// # Errors
    ///
    /// Fails with [`BinpinError::MissingMarker`] if the module line lacks the marker
    /// comment, or [`BinpinError::UnparsableManifest`] for invalid content.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ModFile> {
        Self::open_with(path.as_ref(), false)
    }

    /// Opens a module file binpin created itself, adding the marker if missing.
    fn open_managed(path: &Path) -> Result<ModFile> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, insert_marker: bool) -> Result<ModFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open module file {}", path.display()))?;
        let mut mf = ModFile {
            path: path.to_path_buf(),
            file,
            doc: ModDocument::default(),
            direct: None,
            auto_replace_disabled: false,
        };
        mf.reload()?;

        if let Err(err) = check_marker(path, &mf.doc) {
            if !insert_marker {
                return Err(err.into());
            }
            mf.doc.set_module_suffix(MARKER_COMMENT);
        }
        Ok(mf)
    }

    /// Stages a module file at `path`.
    ///
    /// A well-formed `existing` file is copied verbatim so comments and replace
    /// directives survive. Otherwise an empty module file is initialised by the
    /// toolchain.
    pub fn create_from_existing_or_new(
        toolchain: &dyn Toolchain,
        existing: Option<&Path>,
        path: &Path,
    ) -> Result<ModFile> {
        remove_if_exists(path)?;

        if let Some(existing) = existing.filter(|e| e.exists()) {
            match direct_package_of(existing) {
                Ok(_) => {
                    fs::copy(existing, path)
                        .with_context(|| format!("copy {} to {}", existing.display(), path.display()))?;
                    return Self::open(path);
                }
                Err(err) => warn!(
                    file = %existing.display(),
                    "tool module file is malformed; it will be recreated: {:#}", err
                ),
            }
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        toolchain
            .init_manifest(dir, path, "_")
            .with_context(|| format!("init module file {}", path.display()))?;
        Self::open_managed(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn direct_package(&self) -> Option<&Package> {
        self.direct.as_ref()
    }

    pub fn auto_replace_disabled(&self) -> bool {
        self.auto_replace_disabled
    }

    pub fn replaces(&self) -> Vec<Replace> {
        self.doc.replaces()
    }

    /// Replaces every require with a single direct require of `target`.
    /// Replace directives are left alone.
    pub fn set_direct_require(&mut self, target: Package) {
        self.doc.drop_requires();
        self.doc.add_require(&target.module, target.meta().map(|m| format!("// {}", m)));
        self.direct = Some(target);
    }

    /// Replaces all replace directives.
    pub fn set_replace(&mut self, replaces: &[Replace]) {
        self.doc.set_replaces(replaces);
    }

    /// Writes the document to disk and parses it back.
    pub fn flush(&mut self) -> Result<()> {
        let content = self.doc.format();
        self.file
            .set_len(0)
            .with_context(|| format!("truncate {}", self.path.display()))?;
        self.file.seek(SeekFrom::Start(0)).context("seek")?;
        self.file
            .write_all(content.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        self.reload()
    }

    /// Flushes and releases the file, reporting the first error of both steps.
    pub fn close(mut self) -> Result<()> {
        let flushed = self.flush();
        let synced = self
            .file
            .sync_all()
            .with_context(|| format!("close {}", self.path.display()));
        flushed.and(synced)
    }

    fn reload(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).context("seek")?;
        let mut content = String::new();
        self.file
            .read_to_string(&mut content)
            .with_context(|| format!("read {}", self.path.display()))?;
        self.doc = ModDocument::parse(&self.path, &content)?;

        self.auto_replace_disabled = self.doc.comments().iter().any(|c| c.contains(NO_REPLACE_FETCH));
        self.direct = direct_require(&self.doc);
        self.doc.drop_requires();
        if let Some(direct) = self.direct.take() {
            self.set_direct_require(direct);
        }
        Ok(())
    }
}

fn check_marker(path: &Path, doc: &ModDocument) -> Result<(), BinpinError> {
    match doc.module_suffix() {
        Some(c) if c.trim() == MARKER_COMMENT => Ok(()),
        found => Err(BinpinError::MissingMarker {
            path: path.to_path_buf(),
            expected: MARKER_COMMENT,
            found: found.map_or_else(|| "no comment".to_string(), |c| format!("{:?}", c)),
        }),
    }
}

fn direct_require(doc: &ModDocument) -> Option<Package> {
    let req = doc.requires().into_iter().find(|r| !r.indirect)?;
    let mut pkg = Package { module: req.module, ..Default::default() };
    if let Some(comment) = &req.comment {
        (pkg.rel_path, pkg.build_envs, pkg.build_flags) = parse_package_meta(comment_text(comment));
    }
    Some(pkg)
}

/// Reads a module file without holding it open.
pub fn parse_mod_file(path: &Path) -> Result<ModDocument> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(ModDocument::parse(path, &content)?)
}

/// Direct package of a tool module file, read without modifying the file.
///
/// The marker comment is required, as for [`ModFile::open`].
pub fn direct_package_of(path: &Path) -> Result<Option<Package>> {
    let doc = parse_mod_file(path)?;
    check_marker(path, &doc)?;
    Ok(direct_require(&doc))
}

/// All indirect requires of any module file.
pub fn indirect_modules(path: &Path) -> Result<Vec<Module>> {
    let doc = parse_mod_file(path)?;
    Ok(doc.requires().into_iter().filter(|r| r.indirect).map(|r| r.module).collect())
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(file = %path.display(), "removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn managed(body: &str) -> String {
        format!("module _ {}\n\ngo 1.21\n{}", MARKER_COMMENT, body)
    }

    #[test]
    fn test_open_requires_marker() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "tool.mod", "module _\n\ngo 1.21\n");
        let err = ModFile::open(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<BinpinError>(), Some(BinpinError::MissingMarker { .. })));
        // Never auto-corrected.
        assert_eq!(fs::read_to_string(&path).unwrap(), "module _\n\ngo 1.21\n");

        let mf = ModFile::open_managed(&path).unwrap();
        mf.close().unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with(&format!("module _ {}\n", MARKER_COMMENT)));
        ModFile::open(&path).unwrap();
    }

    #[test]
    fn test_open_keeps_only_first_direct_require() {
        let dir = tempdir().unwrap();
        let body = "\nrequire (\n\tgithub.com/a/b v1.0.0 // indirect\n\tgithub.com/c/d v0.2.0 // cmd/d -trimpath\n\tgithub.com/e/f v0.3.0\n)\n";
        let path = write(dir.path(), "d.mod", &managed(body));

        let mut mf = ModFile::open(&path).unwrap();
        let direct = mf.direct_package().unwrap().clone();
        assert_eq!(direct.module, Module::new("github.com/c/d", "v0.2.0"));
        assert_eq!(direct.rel_path, "cmd/d");
        assert_eq!(direct.build_flags, vec!["-trimpath"]);

        mf.flush().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, managed("\nrequire github.com/c/d v0.2.0 // cmd/d -trimpath\n"));
    }

    #[test]
    fn test_set_direct_require_round_trip() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "x.mod", &managed(""));
        let mut mf = ModFile::open(&path).unwrap();

        let cases = vec![
            Package { module: Module::new("github.com/x/y", "v1.0.0"), ..Default::default() },
            Package {
                module: Module::new("github.com/x/y", "v0.0.0-20200101000000-abcdefabcdef"),
                rel_path: "cmd/y".to_string(),
                build_envs: vec!["CGO_ENABLED=0".to_string(), "GOOS=linux".to_string()],
                build_flags: vec!["-tags=a,b".to_string(), "-ldflags=-s".to_string()],
            },
            Package {
                module: Module::new("github.com/x/y", "v1.0.0"),
                build_flags: vec!["-trimpath".to_string()],
                ..Default::default()
            },
        ];
        for pkg in cases {
            mf.set_direct_require(pkg.clone());
            mf.flush().unwrap();
            assert_eq!(mf.direct_package(), Some(&pkg));
            assert_eq!(direct_package_of(&path).unwrap(), Some(pkg));
        }
    }

    #[test]
    fn test_replace_and_no_replace_marker() {
        let dir = tempdir().unwrap();
        let body = "\n// binpin:no_replace_fetch\nreplace github.com/a/b => github.com/c/b v1.0.0\n";
        let path = write(dir.path(), "r.mod", &managed(body));

        let mut mf = ModFile::open(&path).unwrap();
        assert!(mf.auto_replace_disabled());
        assert_eq!(mf.replaces().len(), 1);

        mf.set_direct_require(Package { module: Module::new("github.com/a/b", "v1.1.0"), ..Default::default() });
        mf.close().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("// binpin:no_replace_fetch\nreplace github.com/a/b => github.com/c/b v1.0.0\n"));
        assert!(content.ends_with("require github.com/a/b v1.1.0\n"));
    }

    #[test]
    fn test_indirect_modules() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "e.mod",
            "module _\n\nrequire (\n\tgithub.com/a/b v1.0.0 // indirect\n\tgithub.com/c/d v0.1.0\n)\n",
        );
        assert_eq!(indirect_modules(&path).unwrap(), vec![Module::new("github.com/a/b", "v1.0.0")]);
    }
}
