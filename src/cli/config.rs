//! `config` subcommands.
//!
//! Keys accepted by `config set` are the camelCase names used in
//! `update-config.json`: `enabled`, `autoCheck`, `checkInterval`, `source`,
//! `githubToken`, `githubOwner`, `githubRepo`, `localPath`, `autoBackup`.
//! Setting `githubToken` or `localPath` to an empty string or `null` clears it.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::CliContext;
use crate::upgrade::{UpdateConfig, UpdateConfigPatch};

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Show the effective configuration (default)
    Show {
        /// Print raw JSON, including the access token
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration file path
    Path,

    /// Change one setting
    Set {
        /// Setting name, e.g. checkInterval
        key: String,

        /// New value, e.g. daily
        value: String,
    },

    /// Restore the default configuration
    Reset,
}

impl ConfigCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        match self.command {
            Some(ConfigSubcommands::Show {
                json,
            }) => Self::show(context, json).await,
            None => Self::show(context, false).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", context.paths.config_file().display());
                Ok(())
            }
            Some(ConfigSubcommands::Set {
                key,
                value,
            }) => Self::set(context, &key, &value).await,
            Some(ConfigSubcommands::Reset) => Self::reset(context).await,
        }
    }

    async fn show(context: &CliContext, json: bool) -> Result<()> {
        let (coordinator, _events) = context.coordinator().await;
        let config = coordinator.get_config().await;

        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }

        println!("{}", "Update Configuration".bold());
        println!("Location: {}\n", context.paths.config_file().display());
        print_config(&config);
        Ok(())
    }

    async fn set(context: &CliContext, key: &str, value: &str) -> Result<()> {
        let patch = UpdateConfigPatch::from_key_value(key, value)?;
        let (coordinator, _events) = context.coordinator().await;
        let config = coordinator.update_config(patch).await?;

        println!("{} Updated {}", "✓".green(), key.bold());
        print_config(&config);
        Ok(())
    }

    async fn reset(context: &CliContext) -> Result<()> {
        let (coordinator, _events) = context.coordinator().await;
        let config = coordinator.reset_config().await?;

        println!("{} Restored default configuration", "✓".green());
        print_config(&config);
        Ok(())
    }
}

fn print_config(config: &UpdateConfig) {
    let on_off = |flag: bool| if flag { "on".green() } else { "off".red() };

    println!("  enabled:       {}", on_off(config.enabled));
    println!("  autoCheck:     {}", on_off(config.auto_check));
    println!("  checkInterval: {}", config.check_interval.as_str());
    println!("  source:        {}", config.source.as_str());
    println!("  githubOwner:   {}", config.remote_owner);
    println!("  githubRepo:    {}", config.remote_repo_name);
    println!(
        "  githubToken:   {}",
        config.remote_auth_token.as_deref().map_or_else(|| "(none)".dimmed().to_string(), mask_token)
    );
    println!("  localPath:     {}", config.local_feed_dir().display());
    println!("  autoBackup:    {}", on_off(config.auto_backup));
}

/// Show only the last four characters of a secret.
fn mask_token(token: &str) -> String {
    let visible: String = token.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if token.chars().count() <= 4 { "****".to_string() } else { format!("****{visible}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ghp_abcdef1234"), "****1234");
        assert_eq!(mask_token("abc"), "****");
    }
}
