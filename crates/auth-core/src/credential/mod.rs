//! Credential model: per-project API tokens keyed by alias

mod configuration;
mod secret;
mod token;

pub use configuration::{ProjectConfiguration, ALIAS_DEFAULT_TOKEN};
pub use secret::ApiKey;
pub use token::{validate_token, ProjectToken, AUTHORIZATION_METADATA_KEY};
