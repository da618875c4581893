//! Config command handlers

use anyhow::{bail, Context, Result};

use dombind_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "path": config.path,
                    "root_ref": config.root_ref,
                    "reconnect_initial_ms": config.reconnect_initial_ms,
                    "reconnect_max_ms": config.reconnect_max_ms,
                    "endpoint_url": config.endpoint_url(),
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.endpoint_url());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  server_url:           {}", config.server_url);
            println!("  path:                 {}", config.path);
            println!(
                "  root_ref:             {}",
                config.root_ref.as_deref().unwrap_or("(not set)")
            );
            println!("  reconnect_initial_ms: {}", config.reconnect_initial_ms);
            println!("  reconnect_max_ms:     {}", config.reconnect_max_ms);
            println!();
            println!("Endpoint:    {}", config.endpoint_url());
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Print the config file path
pub fn path() -> Result<()> {
    println!("{}", Config::config_file_path().display());
    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    set_value(&mut config, &key, &value)?;
    config.validate()?;

    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn set_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "server_url" => config.server_url = value.to_string(),
        "path" => config.path = value.to_string(),
        "root_ref" => {
            config.root_ref = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "reconnect_initial_ms" => {
            config.reconnect_initial_ms = value
                .parse()
                .context("Invalid value for reconnect_initial_ms. Use milliseconds.")?;
        }
        "reconnect_max_ms" => {
            config.reconnect_max_ms = value
                .parse()
                .context("Invalid value for reconnect_max_ms. Use milliseconds.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: server_url, path, root_ref, reconnect_initial_ms, reconnect_max_ms",
                key
            );
        }
    }
    Ok(())
}
