use std::collections::HashSet;
use anyhow::Result;
use regex::Regex;
use crate::error::BinpinError;

/// Version sentinel meaning "stop pinning this tool".
pub const NONE_VERSION: &str = "none";

/// A parsed `get` target: `name-or-package[@v1[,v2,...]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Lower-cased tool name.
    pub name: String,
    /// Full package path, empty when the tool was referenced by name only.
    pub package_path: String,
    /// Requested versions. A single empty string means "whatever is pinned or latest".
    pub versions: Vec<String>,
}

impl Target {
    /// True when exactly one version was requested and it is empty.
    pub fn has_no_version(&self) -> bool {
        self.versions.len() == 1 && self.versions[0].is_empty()
    }

    pub fn is_none(&self) -> bool {
        self.versions.first().map(String::as_str) == Some(NONE_VERSION)
    }
}

/// Parses a raw target string.
///
/// A package path is recognised by a `/`. Its last element becomes the tool name,
/// unless that element is a major version suffix (`v2`, `v3`, ...) on a path with more
/// than three elements, in which case the element before it is used.
///
/// # Errors
///
/// Returns [`BinpinError::MalformedTarget`] for empty targets, duplicated versions,
/// or `none` mixed with other versions.
pub fn parse_target(raw: &str) -> Result<Target> {
    if raw.is_empty() {
        return Err(BinpinError::malformed_target(raw, "target is empty").into());
    }

    let (name_or_package, versions) = match raw.split_once('@') {
        Some((head, tail)) => (head, tail.split(',').map(str::to_string).collect::<Vec<_>>()),
        None => (raw, vec![String::new()]),
    };
    if name_or_package.is_empty() {
        return Err(BinpinError::malformed_target(raw, "missing tool name or package path").into());
    }

    if versions.len() > 1 {
        let mut seen = HashSet::new();
        for v in &versions {
            if !seen.insert(v.as_str()) {
                return Err(BinpinError::malformed_target(
                    raw,
                    format!("version duplicates are not allowed, got: {:?}", versions),
                ).into());
            }
            if v == NONE_VERSION {
                return Err(BinpinError::malformed_target(
                    raw,
                    format!("none is not allowed when there is more than one version, got: {:?}", versions),
                ).into());
            }
        }
    }

    let mut name = name_or_package.to_string();
    let mut package_path = String::new();
    if name_or_package.contains('/') {
        package_path = name_or_package.trim_end_matches('/').to_string();
        let elems: Vec<&str> = package_path.split('/').collect();
        name = elems[elems.len() - 1].to_string();

        let major_suffix = Regex::new(r"^v[0-9]*$")?;
        if elems.len() > 3 && major_suffix.is_match(&name) {
            name = elems[elems.len() - 2].to_string();
        }
    }

    Ok(Target {
        name: name.to_lowercase(),
        package_path,
        versions,
    })
}
