use std::path::Path;
use anyhow::{Context, Result};
use tracing::debug;
use crate::modfile::remove_if_exists;

/// Points `link_path` at the versioned binary `target`, replacing whatever was
/// there before.
///
/// On Unix this is a symbolic link. On Windows a `.bat` forwarder is written
/// next to `link_path`.
///
/// The old link is removed before the new one is created, so for a moment no
/// link exists.
///
/// # Errors
///
/// Returns an error if the old link cannot be removed or the new one created.
pub fn create_shim<P: AsRef<Path>>(target: P, link_path: P) -> Result<()> {
    let (target, link_path) = (target.as_ref(), link_path.as_ref());
    #[cfg(unix)]
    {
        remove_if_exists(link_path).context("rm")?;
        std::os::unix::fs::symlink(target, link_path)
            .with_context(|| format!("symlink {} -> {}", link_path.display(), target.display()))?;
    }
    #[cfg(windows)]
    {
        let shim = link_path.with_extension("bat");
        remove_if_exists(&shim).context("rm")?;
        let script = format!("@echo off\r\ncall \"{}\" %*\r\n", target.display());
        std::fs::write(&shim, script).with_context(|| format!("write shim {}", shim.display()))?;
    }
    debug!(link = %link_path.display(), target = %target.display(), "linked");
    Ok(())
}
