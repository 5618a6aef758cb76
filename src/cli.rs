use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Directory holding the pinned tool module files
    #[clap(long, global = true, default_value = ".binpin")]
    pub(crate) moddir: PathBuf,

    /// Print debug logs. `RUST_LOG` takes precedence
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: BinpinCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum BinpinCommand {
    /// Pins and installs a tool: <name-or-package>[@<version>[,<version>...]].
    /// Use <name>@none to unpin. Without a target, installs all pinned tools
    Get {
        target: Option<String>,
        /// Update to the latest minor or patch release
        #[clap(short = 'u', long, conflicts_with = "upatch")]
        update: bool,
        /// Update to the latest patch release
        #[clap(long)]
        upatch: bool,
        /// Pin under this name instead of the one derived from the package path
        #[clap(short, long)]
        name: Option<String>,
        /// Rename an already pinned tool
        #[clap(short, long)]
        rename: Option<String>,
        /// Also link <name> to the installed <name>-<version> binary
        #[clap(short, long)]
        link: bool,
    },
    /// List pinned tools, or the versions of one of them
    List {
        target: Option<String>,
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },
}
