//! # auth-core
//!
//! Local credential store for per-project API tokens:
//! - `ProjectToken` / `ProjectConfiguration` model with expiry validation
//! - Bearer materialization for outgoing HTTP requests and RPC metadata
//! - One file per project under the user config directory, written
//!   atomically with owner-only permissions
//!
//! ```no_run
//! use auth_core::{ProjectConfiguration, Store};
//!
//! fn main() -> auth_core::Result<()> {
//!     let store = Store::new();
//!
//!     let mut config = if store.has_configuration("my-project") {
//!         store.get_configuration("my-project")?
//!     } else {
//!         ProjectConfiguration::new("my-project")
//!     };
//!     config.set_default_credentials("my-api-key", None)?;
//!     store.write_configuration(&mut config)?;
//!
//!     let token = config.get_default_credentials()?;
//!     let (_metadata, validation) = token.request_metadata();
//!     validation
//! }
//! ```

pub mod credential;
pub mod error;
pub mod storage;

pub use credential::{
    validate_token, ApiKey, ProjectConfiguration, ProjectToken, ALIAS_DEFAULT_TOKEN,
    AUTHORIZATION_METADATA_KEY,
};
pub use error::{AuthError, Result};
pub use storage::{ConfigDirResolver, FixedConfigDir, Store, UserConfigDir, AUTH_CONFIG_EXTENSION};
