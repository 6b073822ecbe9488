//! Subcommand implementations
//!
//! Output goes to the supplied writer so commands can be exercised in tests.

use std::io::Write;

use auth_core::{ApiKey, AuthError, ProjectConfiguration, Store};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by the command line front end
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("refusing to store unusable credentials: {0}")]
    InvalidCredentials(#[source] AuthError),

    #[error("invalid --valid-until timestamp '{value}': {source}")]
    InvalidExpiry {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("no api key given and prompting is disabled (--batch)")]
    MissingApiKey,

    #[error("cannot read api key: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("stored configuration for project '{0}' has unsafe permissions; fix them (chmod 600) or run logout first")]
    UnsafePermissions(String),

    #[error("project '{0}' has no stored credentials")]
    ProjectNotFound(String),

    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Parse an RFC3339 expiry given on the command line
pub fn parse_valid_until(value: &str) -> CliResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| CliError::InvalidExpiry {
            value: value.to_string(),
            source,
        })
}

/// Store credentials for `project` under `alias`.
///
/// An existing configuration is loaded and updated; other aliases survive.
/// A stored file that fails the permission check is never overwritten.
pub fn login(
    store: &Store,
    project: &str,
    alias: &str,
    api_key: ApiKey,
    valid_until: Option<DateTime<Utc>>,
    out: &mut impl Write,
) -> CliResult<()> {
    let mut config = match store.get_configuration(project) {
        Ok(config) if store.has_configuration(project) => config,
        Ok(_) => return Err(CliError::UnsafePermissions(project.to_string())),
        Err(e) if e.is_not_found() => {
            debug!(project = %project, "Starting new configuration");
            ProjectConfiguration::new(project)
        }
        Err(e) => return Err(e.into()),
    };

    // Validate on a scratch copy so a rejected key never reaches the disk
    let mut candidate = config.clone();
    candidate
        .set_credentials(alias, api_key, valid_until)
        .map_err(CliError::InvalidCredentials)?;
    config = candidate;

    store.write_configuration(&mut config)?;
    info!(project = %project, alias = %alias, "Stored credentials");

    writeln!(out, "Stored credentials for project '{}' (alias '{}')", project, alias)?;
    Ok(())
}

/// Remove one alias, or the whole project when no alias is given
pub fn logout(
    store: &Store,
    project: &str,
    alias: Option<&str>,
    out: &mut impl Write,
) -> CliResult<()> {
    match alias {
        Some(alias) => {
            let config = store.get_configuration(project).map_err(|e| {
                if e.is_not_found() {
                    CliError::ProjectNotFound(project.to_string())
                } else {
                    CliError::Auth(e)
                }
            })?;
            if !config.has_credentials(alias) {
                return Err(AuthError::AliasNotFound(alias.to_string()).into());
            }
            store.remove_alias(project, alias)?;
            writeln!(out, "Removed alias '{}' from project '{}'", alias, project)?;
        }
        None => {
            store.remove_configuration(project)?;
            writeln!(out, "Removed credentials for project '{}'", project)?;
        }
    }
    Ok(())
}

/// List stored projects, or the aliases of one project
pub fn list(store: &Store, project: Option<&str>, out: &mut impl Write) -> CliResult<()> {
    let Some(project) = project else {
        let mut names = store.list_configurations()?;
        names.sort();
        for name in names {
            writeln!(out, "{}", name)?;
        }
        return Ok(());
    };

    if !store.has_configuration(project) {
        return Err(CliError::ProjectNotFound(project.to_string()));
    }
    let config = store.get_configuration(project)?;
    for alias in config.aliases() {
        let token = config.get_credentials(alias)?;
        let expiry = match token.valid_until {
            Some(until) => until.to_rfc3339(),
            None => "never".to_string(),
        };
        let status = match token.validate() {
            Ok(()) => "valid".to_string(),
            Err(e) => e.to_string(),
        };
        writeln!(out, "{}\texpires: {}\t{}", alias, expiry, status)?;
    }
    Ok(())
}
