//! Filesystem persistence for project configurations
//!
//! One file per project under the user's configuration directory. The root
//! is supplied by a [`ConfigDirResolver`] fixed at store construction.

mod file_store;
mod resolver;

pub use file_store::{Store, AUTH_CONFIG_EXTENSION};
pub use resolver::{ConfigDirResolver, FixedConfigDir, UserConfigDir};
