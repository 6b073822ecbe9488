//! inctl-auth - manage per-project API keys stored in the user config directory
//!
//! Credentials live in `<config-dir>/intrinsic/projects/<project>.user-token`,
//! readable by the owning user only.

use std::path::PathBuf;
use std::process::ExitCode;

use auth_core::{ApiKey, Store, ALIAS_DEFAULT_TOKEN};
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;

use commands::{CliError, CliResult};

/// Manage API keys for cloud projects
#[derive(Parser, Debug)]
#[command(name = "inctl-auth")]
#[command(version)]
#[command(about = "Manage locally stored API keys for cloud projects")]
struct Args {
    /// Override the configuration root (defaults to the OS user config dir)
    #[arg(long, global = true, env = "INCTL_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an API key for a project
    Login {
        /// Cloud project name
        #[arg(long)]
        project: String,

        /// Alias to store the key under
        #[arg(long, default_value = ALIAS_DEFAULT_TOKEN)]
        alias: String,

        /// API key; prompted for when omitted
        #[arg(long, env = "INCTL_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Expiry as an RFC3339 timestamp
        #[arg(long)]
        valid_until: Option<String>,

        /// Never prompt; fail if no key was given
        #[arg(long)]
        batch: bool,
    },

    /// Remove stored API keys
    Logout {
        /// Cloud project name
        #[arg(long)]
        project: String,

        /// Remove only this alias instead of the whole project
        #[arg(long)]
        alias: Option<String>,
    },

    /// List stored projects, or the aliases of one project
    List {
        /// Show aliases of this project
        #[arg(long)]
        project: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so stdout stays scriptable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> CliResult<()> {
    let store = match args.config_dir {
        Some(dir) => Store::with_config_dir(dir),
        None => Store::new(),
    };
    debug!(store = ?store, "Using credential store");

    let mut stdout = std::io::stdout().lock();

    match args.command {
        Command::Login {
            project,
            alias,
            api_key,
            valid_until,
            batch,
        } => {
            let valid_until = valid_until
                .as_deref()
                .map(commands::parse_valid_until)
                .transpose()?;
            let api_key = match api_key {
                Some(key) => ApiKey::new(key),
                None if batch => return Err(CliError::MissingApiKey),
                None => rpassword::prompt_password(format!("API key for '{}': ", project))
                    .map(ApiKey::new)
                    .map_err(CliError::Prompt)?,
            };
            commands::login(&store, &project, &alias, api_key, valid_until, &mut stdout)
        }
        Command::Logout { project, alias } => {
            commands::logout(&store, &project, alias.as_deref(), &mut stdout)
        }
        Command::List { project } => commands::list(&store, project.as_deref(), &mut stdout),
    }
}

/// Render an error with all of its sources
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
