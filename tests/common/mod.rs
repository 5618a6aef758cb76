#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Result};
use tempfile::TempDir;
use binpin::global::utils::ToolPaths;
use binpin::toolchain::{ModContext, Toolchain, UpdatePolicy};

/// In-memory stand-in for `go`. Knows a fixed set of modules and their versions.
pub struct FakeToolchain {
    /// Module path and its versions, ascending.
    modules: Vec<(String, Vec<String>)>,
    gopath: PathBuf,
    pub non_main: RefCell<Vec<String>>,
    /// Extra modules added as indirect requires on every resolution.
    pub extra_indirect: RefCell<Vec<(String, String)>>,
    pub fail_resolve: Cell<bool>,
    pub silent_resolve: Cell<bool>,
    pub fail_build: Cell<bool>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeToolchain {
    pub fn new(gopath: &Path) -> Self {
        FakeToolchain {
            modules: vec![
                (
                    "github.com/acme/tool".to_string(),
                    vec!["v1.0.0".to_string(), "v1.2.0".to_string(), "v1.3.0".to_string()],
                ),
                ("github.com/acme/lib".to_string(), vec!["v0.1.0".to_string()]),
            ],
            gopath: gopath.to_path_buf(),
            non_main: RefCell::new(vec!["github.com/acme/lib".to_string()]),
            extra_indirect: RefCell::new(Vec::new()),
            fail_resolve: Cell::new(false),
            silent_resolve: Cell::new(false),
            fail_build: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn module_of(&self, package: &str) -> Option<&(String, Vec<String>)> {
        self.modules
            .iter()
            .filter(|(m, _)| package == m || package.starts_with(&format!("{}/", m)))
            .max_by_key(|(m, _)| m.len())
    }
}

impl Toolchain for FakeToolchain {
    fn resolve_dependency(&self, ctx: &ModContext, update: UpdatePolicy, target: &str) -> Result<String> {
        self.calls.borrow_mut().push(format!("resolve {}", target));
        if self.fail_resolve.get() {
            bail!("go: module lookup disabled by GOPROXY=off");
        }
        let (package, version) = target.split_once('@').unwrap_or((target, ""));
        let (module, versions) = self
            .module_of(package)
            .ok_or_else(|| anyhow!("go: {}: no matching versions", package))?;

        let resolved = if version.is_empty() || update.is_update() {
            versions.last().cloned().unwrap_or_default()
        } else if version.starts_with("v0.0.0-") || versions.iter().any(|v| v == version) {
            version.to_string()
        } else {
            bail!("go: {}@{}: invalid version: unknown revision", package, version);
        };

        if self.silent_resolve.get() {
            return Ok(String::new());
        }
        let mut file = OpenOptions::new().append(true).open(ctx.mod_file)?;
        writeln!(file, "\nrequire {} {} // indirect", module, resolved)?;
        for (path, v) in self.extra_indirect.borrow().iter() {
            writeln!(file, "require {} {} // indirect", path, v)?;
        }
        Ok(format!("go: added {} {}", module, resolved))
    }

    fn list_package_kind(&self, _ctx: &ModContext, _build_flags: &[String], package: &str) -> Result<String> {
        self.calls.borrow_mut().push(format!("list {}", package));
        if self.non_main.borrow().iter().any(|p| p == package) {
            return Ok("lib".to_string());
        }
        Ok("main".to_string())
    }

    fn build(
        &self,
        ctx: &ModContext,
        package: &str,
        out: &Path,
        build_flags: &[String],
        build_envs: &[String],
    ) -> Result<()> {
        self.calls.borrow_mut().push(format!("build {} {}", package, out.display()));
        if self.fail_build.get() {
            bail!("go: build failed: compile error");
        }
        let pinned = fs::read_to_string(ctx.mod_file)?;
        fs::write(out, format!("{}\n{:?} {:?}\n{}", package, build_flags, build_envs, pinned))?;
        Ok(())
    }

    fn env_var(&self, name: &str) -> Result<String> {
        match name {
            "GOPATH" => Ok(self.gopath.display().to_string()),
            _ => Ok(String::new()),
        }
    }

    fn init_manifest(&self, _dir: &Path, mod_file: &Path, module: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("init {}", mod_file.display()));
        fs::write(mod_file, format!("module {}\n\ngo 1.21\n", module))?;
        Ok(())
    }
}

/// A temporary workspace with a pin directory, a bin directory and a GOPATH.
pub struct Workspace {
    pub dir: TempDir,
    pub paths: ToolPaths,
    pub gopath: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let gopath = dir.path().join("gopath");
        let paths = ToolPaths {
            mod_dir: dir.path().join(".binpin"),
            bin_dir: gopath.join("bin"),
            mod_cache: gopath.join("pkg").join("mod"),
        };
        Workspace { dir, paths, gopath }
    }

    pub fn toolchain(&self) -> FakeToolchain {
        FakeToolchain::new(&self.gopath)
    }

    pub fn mod_file(&self, name: &str) -> PathBuf {
        self.paths.mod_dir.join(name)
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.mod_file(name)).unwrap()
    }

    pub fn bin(&self, name: &str) -> PathBuf {
        self.paths.bin_dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }

    /// Adds `<version>.info` for `module` to the module download cache.
    pub fn cache_version(&self, module: &str, version: &str) {
        let dir = self.paths.mod_cache.join("cache").join("download").join(module).join("@v");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.info", version)), "{}").unwrap();
        let list = dir.join("list");
        let mut versions = fs::read_to_string(&list).unwrap_or_default();
        versions.push_str(version);
        versions.push('\n');
        fs::write(list, versions).unwrap();
    }

    /// Writes the module file the toolchain extracted for `module@version`.
    pub fn extracted_mod_file(&self, module: &str, version: &str, content: &str) {
        let dir = self.gopath.join("pkg").join("mod").join(format!("{}@{}", module, version));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("go.mod"), content).unwrap();
    }
}
