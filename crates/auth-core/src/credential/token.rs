//! Project token and its bearer materialization

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::secret::ApiKey;
use crate::error::{AuthError, Result};

/// Metadata key carrying the bearer credential on outgoing RPCs
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Cloud project bound API token
///
/// Tokens are replaced wholesale in a [`ProjectConfiguration`](super::ProjectConfiguration),
/// never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectToken {
    /// The secret API key
    pub api_key: ApiKey,

    /// Expiry; `None` means the token never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl ProjectToken {
    /// Create a new token
    pub fn new(api_key: impl Into<ApiKey>, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            api_key: api_key.into(),
            valid_until,
        }
    }

    /// Validate the token against the current time
    pub fn validate(&self) -> Result<()> {
        self.validate_at(Utc::now())
    }

    fn validate_at(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(valid_until) = self.valid_until {
            if now > valid_until {
                return Err(AuthError::ExpiredToken(valid_until));
            }
        }
        if self.api_key.is_empty() {
            return Err(AuthError::MissingApiKey);
        }
        Ok(())
    }

    /// Whether the token has an expiry that already passed
    pub fn is_expired(&self) -> bool {
        self.valid_until.is_some_and(|until| Utc::now() > until)
    }

    /// Time left until expiry, `None` for tokens that never expire
    pub fn expires_in(&self) -> Option<Duration> {
        self.valid_until.map(|until| until - Utc::now())
    }

    /// Bearer value for the authorization header
    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose())
    }

    /// RPC metadata carrying this token.
    ///
    /// The metadata is always formed; the second element is the validation
    /// result and must be treated as fatal for the call when it is an error.
    pub fn request_metadata(&self) -> (HashMap<String, String>, Result<()>) {
        let mut metadata = HashMap::with_capacity(1);
        metadata.insert(AUTHORIZATION_METADATA_KEY.to_string(), self.bearer());
        (metadata, self.validate())
    }

    /// Credentials must only travel over TLS
    pub fn require_transport_security(&self) -> bool {
        true
    }

    /// Set the `Authorization` header on `request`.
    ///
    /// The header is set even for an invalid token; the returned error tells
    /// the caller to abort the request.
    pub fn http_authorization(&self, request: &mut reqwest::Request) -> Result<()> {
        let mut value = HeaderValue::from_str(&self.bearer())
            .map_err(|e| AuthError::InvalidHeaderValue(e.to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.validate()
    }
}

/// Validate a possibly absent token
pub fn validate_token(token: Option<&ProjectToken>) -> Result<()> {
    match token {
        Some(token) => token.validate(),
        None => Err(AuthError::NilToken),
    }
}
