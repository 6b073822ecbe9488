//! Project configuration: named collection of aliased tokens

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::secret::ApiKey;
use super::token::ProjectToken;
use crate::error::{AuthError, Result};

/// Alias under which the default token is stored
pub const ALIAS_DEFAULT_TOKEN: &str = "default";

/// API tokens belonging to one cloud project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfiguration {
    /// Project name, also the key of the backing file
    pub name: String,

    /// Tokens by alias
    #[serde(default, deserialize_with = "deserialize_tokens")]
    pub tokens: HashMap<String, ProjectToken>,

    /// Set by the store on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Accepts a missing or `null` token map and drops `null` entries.
fn deserialize_tokens<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, ProjectToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<ProjectToken>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(alias, token)| match token {
            Some(token) => Some((alias, token)),
            None => {
                tracing::warn!(alias = %alias, "Skipping null token entry");
                None
            }
        })
        .collect())
}

impl ProjectConfiguration {
    /// Create an empty configuration for the given project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: HashMap::new(),
            last_updated: None,
        }
    }

    /// Store `api_key` under `alias`, replacing any previous token.
    ///
    /// The token is inserted even when it does not validate; the error only
    /// reports that what was stored is unusable (e.g. an empty key).
    pub fn set_credentials(
        &mut self,
        alias: &str,
        api_key: impl Into<ApiKey>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<&mut Self> {
        let token = ProjectToken::new(api_key, valid_until);
        let validation = token.validate();
        self.tokens.insert(alias.to_string(), token);
        validation.map(|()| self)
    }

    /// Store `api_key` under the default alias
    pub fn set_default_credentials(
        &mut self,
        api_key: impl Into<ApiKey>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<&mut Self> {
        self.set_credentials(ALIAS_DEFAULT_TOKEN, api_key, valid_until)
    }

    /// Whether a token is stored under `alias`; no validation is done
    pub fn has_credentials(&self, alias: &str) -> bool {
        self.tokens.contains_key(alias)
    }

    /// Token stored under `alias`
    pub fn get_credentials(&self, alias: &str) -> Result<&ProjectToken> {
        self.tokens
            .get(alias)
            .ok_or_else(|| AuthError::AliasNotFound(alias.to_string()))
    }

    /// Token stored under the default alias
    pub fn get_default_credentials(&self) -> Result<&ProjectToken> {
        self.get_credentials(ALIAS_DEFAULT_TOKEN)
    }

    /// Drop the token stored under `alias`, returning it if present
    pub fn remove_credentials(&mut self, alias: &str) -> Option<ProjectToken> {
        self.tokens.remove(alias)
    }

    /// Alias names in sorted order
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}
