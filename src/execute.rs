use anyhow::Result;
use binpin::global::utils::ToolPaths;
use binpin::list::{list_pinned, render_table};
use binpin::toolchain::{Deadline, GoToolchain, UpdatePolicy, GET_TIMEOUT};
use binpin::{get, GetConfig};
use crate::cli::{BinpinCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    match cli.command {
        BinpinCommand::Get { target, update, upatch, name, rename, link } => {
            let update = match (update, upatch) {
                (_, true) => UpdatePolicy::Patch,
                (true, false) => UpdatePolicy::Minor,
                (false, false) => UpdatePolicy::None,
            };
            let cfg = GetConfig { update, name, rename, link };
            execute_get(&cli.moddir, &cfg, target.as_deref().unwrap_or_default())
        }
        BinpinCommand::List { target, json } => {
            execute_list(&cli.moddir, target.as_deref(), json)
        }
    }
}

pub fn execute_get(mod_dir: &std::path::Path, cfg: &GetConfig, target: &str) -> Result<()> {
    let paths = ToolPaths::from_env(mod_dir)?;
    let toolchain = GoToolchain::new(Deadline::after(GET_TIMEOUT));
    get(&toolchain, &paths, cfg, target)
}

pub fn execute_list(mod_dir: &std::path::Path, target: Option<&str>, json: bool) -> Result<()> {
    let mut tools = list_pinned(mod_dir, false)?;
    if json {
        if let Some(target) = target {
            tools.retain(|t| t.name == target);
            if tools.is_empty() {
                anyhow::bail!("pinned tool {} not found", target);
            }
        }
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }
    println!("{}", render_table(&tools, target)?);
    Ok(())
}
