use std::fmt;
use serde::Serialize;

/// Module path and version pair, stored unescaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Module {
    pub path: String,
    /// Empty when unresolved, `none` when uninstalling.
    pub version: String,
}

impl Module {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Module { path: path.into(), version: version.into() }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}@{}", self.path, self.version)
        }
    }
}

/// A buildable package pinned by a tool manifest.
///
/// `module.path` joined with `rel_path` gives the full package path. When the module
/// path is empty and `rel_path` is set, the module boundary is not known yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Package {
    pub module: Module,
    pub rel_path: String,
    /// `KEY=VALUE` pairs set in the environment of the build.
    pub build_envs: Vec<String>,
    pub build_flags: Vec<String>,
}

impl Package {
    /// A package whose module boundary is unknown.
    pub fn unresolved(package_path: &str, version: &str) -> Self {
        Package {
            module: Module::new("", version),
            rel_path: package_path.to_string(),
            ..Default::default()
        }
    }

    /// Full package path.
    pub fn path(&self) -> String {
        join_path(&self.module.path, &self.rel_path)
    }

    /// Re-bases the package onto `module`, recomputing the relative path.
    pub fn rebase(&mut self, module: Module) {
        let full = self.path();
        self.rel_path = strip_module_prefix(&full, &module.path);
        self.module = module;
    }

    /// Encodes relative path, build envs and build flags, in that order.
    pub fn meta(&self) -> Option<String> {
        let mut meta: Vec<&str> = Vec::new();
        if !self.rel_path.is_empty() && self.rel_path != "." {
            meta.push(&self.rel_path);
        }
        meta.extend(self.build_envs.iter().map(String::as_str));
        meta.extend(self.build_flags.iter().map(String::as_str));
        if meta.is_empty() {
            None
        } else {
            Some(meta.join(" "))
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.version.is_empty() {
            write!(f, "{}", self.path())
        } else {
            write!(f, "{}@{}", self.path(), self.module.version)
        }
    }
}

/// Decodes the direct require comment: `[relpath] [ENV=VAL ...] [-flag ...]`.
/// Everything from the first element starting with `-` is a build flag.
pub fn parse_package_meta(line: &str) -> (String, Vec<String>, Vec<String>) {
    let mut rel_path = String::new();
    let mut envs = Vec::new();
    let mut flags = Vec::new();

    let elems: Vec<&str> = line.split(' ').filter(|e| !e.is_empty()).collect();
    for (i, elem) in elems.iter().enumerate() {
        if elem.starts_with('-') {
            flags = elems[i..].iter().map(|s| s.to_string()).collect();
            break;
        }
        if elem.contains('=') {
            envs.push(elem.to_string());
        } else {
            rel_path = elem.to_string();
        }
    }
    (rel_path, envs, flags)
}

/// Joins slash separated paths, skipping empty and `.` elements.
pub fn join_path(a: &str, b: &str) -> String {
    a.split('/')
        .chain(b.split('/'))
        .filter(|e| !e.is_empty() && *e != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of `full` relative to `module`, empty if they are equal.
pub fn strip_module_prefix(full: &str, module: &str) -> String {
    if module.is_empty() {
        return full.to_string();
    }
    match full.strip_prefix(module) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => full.to_string(),
    }
}

/// Case-encodes a module path for on-disk use: every upper-case letter becomes `!`
/// followed by its lower-case form.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Tagged and pseudo versions start with `v`; anything else is a revision.
pub fn is_tagged_version(version: &str) -> bool {
    version.starts_with('v')
}

pub fn is_incompatible_version(version: &str) -> bool {
    version.ends_with("+incompatible")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_joins_module_and_rel_path() {
        let pkg = Package {
            module: Module::new("github.com/a/b", "v1.0.0"),
            rel_path: "cmd/b".to_string(),
            ..Default::default()
        };
        assert_eq!(pkg.path(), "github.com/a/b/cmd/b");
        assert_eq!(pkg.to_string(), "github.com/a/b/cmd/b@v1.0.0");

        let unresolved = Package::unresolved("github.com/a/b/cmd/b", "");
        assert_eq!(unresolved.path(), "github.com/a/b/cmd/b");
        assert_eq!(unresolved.to_string(), "github.com/a/b/cmd/b");
    }

    #[test]
    fn test_rebase_recomputes_rel_path() {
        let mut pkg = Package::unresolved("github.com/a/b/cmd/b", "");
        pkg.rebase(Module::new("github.com/a/b", "v1.2.0"));
        assert_eq!(pkg.rel_path, "cmd/b");
        pkg.rebase(Module::new("github.com/a/b/cmd/b", "v1.2.0"));
        assert_eq!(pkg.rel_path, "");
        // Prefix must end on an element boundary.
        assert_eq!(strip_module_prefix("github.com/a/bc", "github.com/a/b"), "github.com/a/bc");
    }

    #[test]
    fn test_meta_encoding() {
        let pkg = Package {
            module: Module::new("github.com/a/b", "v1.0.0"),
            rel_path: "cmd/b".to_string(),
            build_envs: vec!["CGO_ENABLED=0".to_string()],
            build_flags: vec!["-tags=netgo".to_string(), "-trimpath".to_string()],
        };
        let meta = pkg.meta().unwrap();
        assert_eq!(meta, "cmd/b CGO_ENABLED=0 -tags=netgo -trimpath");
        let (rel, envs, flags) = parse_package_meta(&meta);
        assert_eq!(rel, pkg.rel_path);
        assert_eq!(envs, pkg.build_envs);
        assert_eq!(flags, pkg.build_flags);

        assert_eq!(Package::unresolved("github.com/a/b", "").meta(), Some("github.com/a/b".to_string()));
        let mut bare = Package::default();
        bare.rel_path = ".".to_string();
        assert_eq!(bare.meta(), None);
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("github.com/BurntSushi/toml@v1.0.0"), "github.com/!burnt!sushi/toml@v1.0.0");
        assert_eq!(escape_path("golang.org/x/tools"), "golang.org/x/tools");
    }

    #[test]
    fn test_version_kinds() {
        assert!(is_tagged_version("v1.2.3"));
        assert!(is_tagged_version("v0.0.0-20200101000000-abcdefabcdef"));
        assert!(!is_tagged_version("abcdefabcdef"));
        assert!(is_incompatible_version("v2.0.0+incompatible"));
        assert!(!is_incompatible_version("v2.0.0"));
    }
}
