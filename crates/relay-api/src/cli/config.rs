//! `relayd config` subcommands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use console::style;

use relay_infra::config::{self, LoadedConfig};

use crate::cli::ConfigAction;

/// Path the CLI reads its config from: `--config` or the default location.
pub fn effective_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

pub async fn handle(action: ConfigAction, explicit: Option<&Path>, json: bool) -> Result<()> {
    match action {
        ConfigAction::Init { force } => init(&effective_path(explicit), force).await,
        ConfigAction::Show => {
            let loaded = config::load_config(explicit).await?;
            show(&loaded, json)
        }
        ConfigAction::Path => {
            let path = effective_path(explicit);
            if json {
                println!("{}", serde_json::json!({ "path": path.display().to_string() }));
            } else {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

async fn init(path: &Path, force: bool) -> Result<()> {
    config::write_default_config(path, force).await?;
    println!();
    println!(
        "  {} Wrote default config to {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    println!(
        "  {}",
        style("Set RELAY_BACKEND_API_KEY in the environment if your backend needs a key.").dim()
    );
    println!();
    Ok(())
}

fn show(loaded: &LoadedConfig, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "path": loaded.path.display().to_string(),
            "from_file": loaded.from_file,
            "api_key_set": loaded.api_key.is_some(),
            "config": loaded.config,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let source = if loaded.from_file {
        format!("{}", loaded.path.display())
    } else {
        format!("defaults ({} not found)", loaded.path.display())
    };
    println!("# source: {source}");
    println!(
        "# api key: {}",
        if loaded.api_key.is_some() { "set" } else { "not set" }
    );
    println!();
    print!("{}", config::render_config(&loaded.config)?);
    Ok(())
}
