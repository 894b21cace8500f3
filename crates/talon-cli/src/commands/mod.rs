use clap::{Parser, Subcommand};
use std::path::PathBuf;

use talon_config::{ConfigLoader, TalonConfig};

mod jobs;
mod serve;
mod skills;

/// 🦅 Talon: skill runtime and cron scheduler
#[derive(Parser)]
#[command(name = "talon", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to talon.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and run skills
    Skills {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Manage scheduled jobs
    Jobs {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Run the scheduler loop (and the skill watcher, if enabled) until Ctrl-C
    Serve,
}

#[derive(Subcommand)]
enum SkillAction {
    /// List loaded skills
    List,
    /// Rank skills against a free-text request
    Search {
        query: String,
        /// Number of results
        #[arg(short, default_value = "3")]
        k: usize,
    },
    /// Run a skill
    Run {
        id: String,
        /// Parameters as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,
        /// Timeout in seconds (overrides the skill and config defaults)
        #[arg(long)]
        timeout: Option<u64>,
        /// Confirm proposals without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Re-read the skill directories and report what loaded
    Reload,
}

#[derive(Subcommand)]
enum JobAction {
    /// List scheduled jobs with their next run time
    List,
    /// Delete a job
    Delete { id: String },
    /// Stop a job from firing until resumed
    Pause { id: String },
    /// Resume a paused job
    Resume { id: String },
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

impl Cli {
    pub async fn run(self) -> talon_core::Result<()> {
        let config = ConfigLoader::load(self.config.as_deref())?.into_config();

        // --verbose > --quiet > --log-level > config; RUST_LOG beats all of them.
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_tracing(&config, log_level);

        match self.command {
            Commands::Skills { action } => skills::cmd_skills(config, action).await,
            Commands::Jobs { action } => jobs::cmd_jobs(config, action).await,
            Commands::Serve => serve::cmd_serve(config).await,
        }
    }
}

fn init_tracing(config: &TalonConfig, log_level: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };

    match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_pairs() {
        assert_eq!(parse_key_val("name=Ada"), Ok(("name".into(), "Ada".into())));
        assert_eq!(parse_key_val("expr=a=b"), Ok(("expr".into(), "a=b".into())));
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn run_arguments() {
        let cli = Cli::try_parse_from([
            "talon", "skills", "run", "greet", "-p", "name=Ada", "--timeout", "5", "--yes",
        ])
        .unwrap();
        let Commands::Skills {
            action: SkillAction::Run { id, param, timeout, yes },
        } = cli.command
        else {
            panic!("expected skills run");
        };
        assert_eq!(id, "greet");
        assert_eq!(param, vec![("name".to_string(), "Ada".to_string())]);
        assert_eq!(timeout, Some(5));
        assert!(yes);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["talon", "-v", "-q", "serve"]).is_err());
    }
}
