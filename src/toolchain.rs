//! The Go toolchain, seen as an opaque collaborator.
//!
//! Everything binpin needs from `go` goes through the [`Toolchain`] trait so that
//! resolution and installation can be exercised without a Go installation.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use tracing::debug;
use crate::error::BinpinError;

/// Upper bound for a whole `get` invocation, resolution and builds included.
pub const GET_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    #[default]
    None,
    /// `-u`: latest minor or patch release.
    Minor,
    /// `-u=patch`: latest patch release.
    Patch,
}

impl UpdatePolicy {
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            UpdatePolicy::None => None,
            UpdatePolicy::Minor => Some("-u"),
            UpdatePolicy::Patch => Some("-u=patch"),
        }
    }

    pub fn is_update(&self) -> bool {
        *self != UpdatePolicy::None
    }
}

/// The module file and working directory a toolchain command runs against.
#[derive(Debug, Clone, Copy)]
pub struct ModContext<'a> {
    pub mod_file: &'a Path,
    pub dir: &'a Path,
}

impl<'a> ModContext<'a> {
    pub fn new(mod_file: &'a Path, dir: &'a Path) -> Self {
        ModContext { mod_file, dir }
    }
}

pub trait Toolchain {
    /// Resolves `target` (`package[@version]`) into the context's module file,
    /// returning the toolchain output.
    fn resolve_dependency(&self, ctx: &ModContext, update: UpdatePolicy, target: &str) -> Result<String>;

    /// Reports the declared package name of `package`, `main` for commands.
    fn list_package_kind(&self, ctx: &ModContext, build_flags: &[String], package: &str) -> Result<String>;

    fn build(
        &self,
        ctx: &ModContext,
        package: &str,
        out: &Path,
        build_flags: &[String],
        build_envs: &[String],
    ) -> Result<()>;

    fn env_var(&self, name: &str) -> Result<String>;

    /// Creates a fresh module file at `mod_file` declaring module `module`.
    fn init_manifest(&self, dir: &Path, mod_file: &Path, module: &str) -> Result<()>;
}

/// Point in time after which no toolchain command may keep running.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// [`Toolchain`] backed by the `go` binary.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: PathBuf,
    deadline: Deadline,
}

impl GoToolchain {
    pub fn new(deadline: Deadline) -> Self {
        GoToolchain { go: PathBuf::from("go"), deadline }
    }

    pub fn with_binary(mut self, go: impl Into<PathBuf>) -> Self {
        self.go = go.into();
        self
    }

    /// Commands run inside the pin directory, so paths handed to them must not be relative.
    fn absolute(path: &Path) -> Result<String> {
        let abs = std::path::absolute(path).with_context(|| format!("absolute path of {}", path.display()))?;
        Ok(abs.display().to_string())
    }

    fn modfile_arg(path: &Path) -> Result<String> {
        Ok(format!("-modfile={}", Self::absolute(path)?))
    }

    /// Runs `go` with the given arguments and returns combined stdout and stderr.
    fn run(&self, dir: Option<&Path>, envs: &[String], args: &[String]) -> Result<String> {
        let command = format!("{} {}", self.go.display(), args.join(" "));
        debug!(command = %command, "running toolchain");

        let mut cmd = Command::new(&self.go);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        for env in envs {
            if let Some((key, value)) = env.split_once('=') {
                cmd.env(key, value);
            }
        }

        let mut child = cmd.spawn().with_context(|| format!("spawn `{}`", command))?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            match child.try_wait().with_context(|| format!("wait for `{}`", command))? {
                Some(status) => break status,
                None if self.deadline.expired() => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BinpinError::DeadlineExceeded(command).into());
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let mut output = String::new();
        for reader in [stdout, stderr].into_iter().flatten() {
            match reader.join() {
                Ok(text) => output.push_str(&text),
                Err(_) => output.push_str("\n(output truncated: reader thread panicked)"),
            }
        }
        let output = output.trim().to_string();

        if !status.success() {
            return Err(BinpinError::Toolchain { command, output }.into());
        }
        Ok(output)
    }
}

/// Reads a pipe to its end. A read error is appended to what was read so far.
fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || read_all(&mut reader))
}

fn read_all<R: Read>(reader: &mut R) -> String {
    let mut buf = Vec::new();
    let result = reader.read_to_end(&mut buf);
    let mut out = String::from_utf8_lossy(&buf).into_owned();
    if let Err(err) = result {
        out.push_str(&format!("\n(output truncated: {})", err));
    }
    out
}

impl Toolchain for GoToolchain {
    fn resolve_dependency(&self, ctx: &ModContext, update: UpdatePolicy, target: &str) -> Result<String> {
        let mut args = vec!["get".to_string(), "-d".to_string()];
        args.extend(update.flag().map(str::to_string));
        args.push(Self::modfile_arg(ctx.mod_file)?);
        args.push(target.to_string());
        self.run(Some(ctx.dir), &[], &args)
    }

    fn list_package_kind(&self, ctx: &ModContext, build_flags: &[String], package: &str) -> Result<String> {
        let mut args = vec!["list".to_string(), Self::modfile_arg(ctx.mod_file)?];
        args.extend(build_flags.iter().cloned());
        args.extend(["-mod=mod".to_string(), "-f={{.Name}}".to_string(), package.to_string()]);
        self.run(Some(ctx.dir), &[], &args)
    }

    fn build(
        &self,
        ctx: &ModContext,
        package: &str,
        out: &Path,
        build_flags: &[String],
        build_envs: &[String],
    ) -> Result<()> {
        let mut args = vec![
            "build".to_string(),
            Self::modfile_arg(ctx.mod_file)?,
            "-mod=mod".to_string(),
            "-o".to_string(),
            Self::absolute(out)?,
        ];
        args.extend(build_flags.iter().cloned());
        args.push(package.to_string());
        self.run(Some(ctx.dir), build_envs, &args).map(|_| ())
    }

    fn env_var(&self, name: &str) -> Result<String> {
        self.run(None, &[], &["env".to_string(), name.to_string()])
    }

    fn init_manifest(&self, dir: &Path, mod_file: &Path, module: &str) -> Result<()> {
        let args = [
            "mod".to_string(),
            "init".to_string(),
            Self::modfile_arg(mod_file)?,
            module.to_string(),
        ];
        self.run(Some(dir), &[], &args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_policy_flags() {
        assert_eq!(UpdatePolicy::None.flag(), None);
        assert_eq!(UpdatePolicy::Minor.flag(), Some("-u"));
        assert_eq!(UpdatePolicy::Patch.flag(), Some("-u=patch"));
        assert!(!UpdatePolicy::default().is_update());
    }

    struct BrokenPipe {
        sent: bool,
    }

    impl Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.sent = true;
            let line = b"go: downloading";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn test_read_error_is_kept_in_output() {
        let out = drain(BrokenPipe { sent: false }).join().unwrap();
        assert_eq!(out, "go: downloading\n(output truncated: pipe closed)");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_failure_output() {
        let go = GoToolchain::new(Deadline::after(Duration::from_secs(10))).with_binary("sh");
        let err = go
            .run(None, &[], &["-c".to_string(), "echo broken >&2; exit 3".to_string()])
            .unwrap_err();
        match err.downcast_ref::<BinpinError>() {
            Some(BinpinError::Toolchain { output, .. }) => assert_eq!(output, "broken"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_passes_envs() {
        let go = GoToolchain::new(Deadline::after(Duration::from_secs(10))).with_binary("sh");
        let out = go
            .run(None, &["BINPIN_TEST=ok".to_string()], &["-c".to_string(), "echo $BINPIN_TEST".to_string()])
            .unwrap();
        assert_eq!(out, "ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_kills_on_deadline() {
        let go = GoToolchain::new(Deadline::after(Duration::from_millis(100))).with_binary("sh");
        let err = go.run(None, &[], &["-c".to_string(), "sleep 5".to_string()]).unwrap_err();
        assert!(matches!(err.downcast_ref::<BinpinError>(), Some(BinpinError::DeadlineExceeded(_))));
    }
}
