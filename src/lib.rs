//! # binpin Core Library
//!
//! This crate contains the core logic of the `binpin` tool: pinning Go tool binaries to exact
//! versions, each in its own module file inside a project's pin directory (`.binpin/` by default).
//!
//! A pinned tool can be rebuilt reproducibly by anyone with a Go toolchain, without the project
//! being a Go module itself. Several versions of one tool may be pinned at once.
//!
//! This library is built for the `binpin` CLI, but you can also reuse it as a backend in other tools.
//!
//! ## Modules Overview
//! - [`target`] – Parsing of `name-or-package[@v1[,v2]]` targets
//! - [`syntax`] – Comment-preserving model of module files
//! - [`modfile`] – Tool module files: open, stage, edit, commit
//! - [`toolchain`] – The `go` collaborator and its deadline
//! - [`resolve`] – Resolving a package into a module and version
//! - [`installer`] – Installing one tool version, from staging to commit
//! - [`get`] – The `get` flow: arrays, renames, uninstalls, bulk refresh
//! - [`list`] – Listing pinned tools
//! - [`shims`] – Linking `<name>` to a versioned binary
//! - [`util`] – Pin directory layout and housekeeping
//! - [`global`] – Go environment paths and the module cache

pub mod error;
pub mod target;
pub mod package;
pub mod syntax;
pub mod modfile;
pub mod toolchain;
pub mod resolve;
pub mod installer;
pub mod get;
pub mod list;
pub mod shims;
pub mod util;
pub mod global;

pub use error::BinpinError;
pub use get::{get, GetConfig};
pub use installer::*;
pub use list::*;
pub use modfile::ModFile;
pub use package::{Module, Package};
pub use target::{parse_target, Target};
pub use toolchain::{Deadline, GoToolchain, ModContext, Toolchain, UpdatePolicy, GET_TIMEOUT};
pub use global::cache::ModCache;
pub use global::utils::ToolPaths;
