use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use anyhow::Result;
use directories::BaseDirs;
use crate::error::BinpinError;

/// Directories binpin reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Pin directory holding one module file per tool.
    pub mod_dir: PathBuf,
    /// Where versioned binaries (and optional links) are installed.
    pub bin_dir: PathBuf,
    /// Root of the Go module cache.
    pub mod_cache: PathBuf,
}

impl ToolPaths {
    /// Discovers install and cache directories from the Go environment variables.
    pub fn from_env<P: AsRef<Path>>(mod_dir: P) -> Result<ToolPaths> {
        let lookup = |name: &str| env::var_os(name);
        Self::from_lookup(mod_dir.as_ref(), lookup, home_dir())
    }

    fn from_lookup<F>(mod_dir: &Path, lookup: F, home: Option<PathBuf>) -> Result<ToolPaths>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let gopath = lookup("GOPATH")
            .and_then(|v| env::split_paths(&v).find(|p| !p.as_os_str().is_empty()))
            .or_else(|| home.map(|h| h.join("go")));

        let pick = |specific: &str, under_gopath: &[&str]| -> Result<PathBuf> {
            if let Some(v) = lookup(specific).filter(|v| !v.is_empty()) {
                return Ok(PathBuf::from(v));
            }
            let gopath = gopath.as_ref().ok_or_else(|| {
                BinpinError::Environment(format!("neither {} nor GOPATH is set and no home directory was found", specific))
            })?;
            Ok(under_gopath.iter().fold(gopath.clone(), |p, e| p.join(e)))
        };

        Ok(ToolPaths {
            mod_dir: mod_dir.to_path_buf(),
            bin_dir: pick("GOBIN", &["bin"])?,
            mod_cache: pick("GOMODCACHE", &["pkg", "mod"])?,
        })
    }
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars.iter().map(|(k, v)| (k.to_string(), OsString::from(v))).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_specific_variables_win() {
        let paths = ToolPaths::from_lookup(
            Path::new(".binpin"),
            lookup(&[("GOBIN", "/opt/bin"), ("GOMODCACHE", "/opt/cache"), ("GOPATH", "/gopath")]),
            None,
        )
        .unwrap();
        assert_eq!(paths.bin_dir, PathBuf::from("/opt/bin"));
        assert_eq!(paths.mod_cache, PathBuf::from("/opt/cache"));
        assert_eq!(paths.mod_dir, PathBuf::from(".binpin"));
    }

    #[test]
    fn test_fallback_to_gopath_then_home() {
        let paths = ToolPaths::from_lookup(Path::new(".binpin"), lookup(&[("GOPATH", "/gopath")]), None).unwrap();
        assert_eq!(paths.bin_dir, PathBuf::from("/gopath/bin"));
        assert_eq!(paths.mod_cache, PathBuf::from("/gopath/pkg/mod"));

        let paths = ToolPaths::from_lookup(Path::new(".binpin"), lookup(&[]), Some(PathBuf::from("/home/me"))).unwrap();
        assert_eq!(paths.bin_dir, PathBuf::from("/home/me/go/bin"));
    }

    #[test]
    fn test_no_environment_at_all() {
        let err = ToolPaths::from_lookup(Path::new(".binpin"), lookup(&[]), None).unwrap_err();
        assert!(matches!(err.downcast_ref::<BinpinError>(), Some(BinpinError::Environment(_))));
    }
}
