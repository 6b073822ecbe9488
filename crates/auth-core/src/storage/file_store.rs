//! File-backed project configuration store
//!
//! Each project lives in its own file under
//! `<config-dir>/intrinsic/projects/<name>.user-token`. The directory is
//! created with mode `0700` and files are written with mode `0600`; there is
//! no encryption at rest, so these permission bits are the only protection
//! against other local users.

use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::resolver::{ConfigDirResolver, FixedConfigDir, UserConfigDir};
use crate::credential::ProjectConfiguration;
use crate::error::{AuthError, Result};

/// Store directory relative to the configuration root
const STORE_DIRECTORY: &str = "intrinsic/projects";

/// File extension of project configuration files
pub const AUTH_CONFIG_EXTENSION: &str = ".user-token";

#[cfg(unix)]
const DIRECTORY_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Collection of project configurations stored as files in the user's
/// config directory.
pub struct Store {
    resolver: Box<dyn ConfigDirResolver>,
}

impl Store {
    /// Create a store rooted in the OS user configuration directory
    pub fn new() -> Self {
        Self::with_resolver(UserConfigDir)
    }

    /// Create a store with a custom configuration root strategy
    pub fn with_resolver(resolver: impl ConfigDirResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Create a store rooted at a fixed directory (for testing)
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self::with_resolver(FixedConfigDir::new(config_dir))
    }

    /// Directory holding all project files
    pub fn store_dir(&self) -> Result<PathBuf> {
        let config_dir = self.resolver.config_dir()?;
        Ok(config_dir.join(STORE_DIRECTORY))
    }

    /// Path of the file backing project `name`
    pub fn configuration_path(&self, name: &str) -> Result<PathBuf> {
        validate_project_name(name)?;
        let store_dir = self.store_dir()?;
        Ok(store_dir.join(format!("{}{}", name, AUTH_CONFIG_EXTENSION)))
    }

    /// Whether a configuration for `name` exists with owner-only
    /// permissions. A file readable or writable by anyone else is reported
    /// as absent.
    pub fn has_configuration(&self, name: &str) -> bool {
        let Ok(path) = self.configuration_path(name) else {
            return false;
        };
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => return false,
        };
        if !metadata.is_file() {
            return false;
        }
        if !has_owner_only_permissions(&metadata) {
            warn!(project = %name, path = ?path, "Ignoring configuration with unsafe permissions");
            return false;
        }
        true
    }

    /// Load the configuration for `name`.
    ///
    /// Permission bits are not checked here; call [`Store::has_configuration`]
    /// first when that guarantee is needed.
    pub fn get_configuration(&self, name: &str) -> Result<ProjectConfiguration> {
        let path = self.configuration_path(name)?;

        let file = fs::File::open(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                AuthError::ConfigurationNotFound {
                    name: name.to_string(),
                    source,
                }
            } else {
                AuthError::ReadConfiguration {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        let mut config: ProjectConfiguration = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| AuthError::DecodeError {
                name: name.to_string(),
                source,
            })?;

        // The file name is authoritative; a rewrite must land in the same file
        if config.name != name {
            warn!(project = %name, stored_name = %config.name, "Configuration name does not match its file, using file name");
            config.name = name.to_string();
        }

        debug!(project = %name, tokens = config.tokens.len(), "Loaded configuration");
        Ok(config)
    }

    /// Persist `config`, stamping `last_updated` with the current UTC time.
    ///
    /// The file is written to a temporary sibling, synced, and renamed into
    /// place. `last_updated` is stamped once the temporary file is open: a
    /// failure before that leaves it untouched, a later failure leaves the
    /// new stamp. Either way the write must be treated as not having happened.
    pub fn write_configuration(&self, config: &mut ProjectConfiguration) -> Result<()> {
        let name = config.name.clone();
        let path = self.configuration_path(&name)?;
        let dir = path
            .parent()
            .ok_or_else(|| AuthError::InvalidProjectName(name.clone()))?;

        create_store_dir(dir).map_err(|source| AuthError::CreateDirectory {
            name: name.clone(),
            source,
        })?;

        // NamedTempFile is created with mode 0600 on unix
        let mut temp = NamedTempFile::new_in(dir).map_err(|source| AuthError::OpenFile {
            name: name.clone(),
            source,
        })?;

        config.last_updated = Some(Utc::now());

        let mut contents = serde_json::to_vec_pretty(&*config).map_err(|source| {
            AuthError::SerializeConfiguration {
                name: name.clone(),
                source,
            }
        })?;
        contents.push(b'\n');

        temp.write_all(&contents)
            .map_err(|source| AuthError::SyncConfiguration {
                name: name.clone(),
                source,
            })?;
        temp.as_file()
            .sync_all()
            .map_err(|source| AuthError::SyncConfiguration {
                name: name.clone(),
                source,
            })?;
        temp.persist(&path)
            .map_err(|e| AuthError::SyncConfiguration {
                name: name.clone(),
                source: e.error,
            })?;

        info!(project = %name, tokens = config.tokens.len(), "Wrote configuration");
        Ok(())
    }

    /// Names of all stored configurations.
    ///
    /// Works on the filesystem level only; a listed name is not guaranteed
    /// to hold a valid configuration. The order is whatever directory
    /// enumeration yields.
    pub fn list_configurations(&self) -> Result<Vec<String>> {
        let store_dir = self.store_dir()?;

        let pattern = format!(
            "{}/*{}",
            glob::Pattern::escape(&store_dir.to_string_lossy()),
            AUTH_CONFIG_EXTENSION
        );
        // Directory part is escaped, the rest is a literal
        let matches = glob::glob(&pattern).expect("store glob pattern is always valid");

        let mut names = Vec::new();
        for entry in matches {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = ?e.path(), error = %e.error(), "Skipping unreadable store entry");
                    continue;
                }
            };
            if let Some(name) = project_name_from_path(&path) {
                names.push(name);
            }
        }

        debug!(count = names.len(), dir = ?store_dir, "Listed configurations");
        Ok(names)
    }

    /// Delete the configuration for `name`; a missing file is not an error
    pub fn remove_configuration(&self, name: &str) -> Result<()> {
        let path = self.configuration_path(name)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(project = %name, "Removed configuration");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(project = %name, "Configuration already absent");
                Ok(())
            }
            Err(source) => Err(AuthError::RemoveConfiguration {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Remove a single alias from a stored configuration.
    ///
    /// The configuration is rewritten even when the alias was absent. This is
    /// a plain read-modify-write without locking: a concurrent writer to the
    /// same project can lose its changes.
    pub fn remove_alias(&self, name: &str, alias: &str) -> Result<()> {
        let mut config = self.get_configuration(name)?;
        config.remove_credentials(alias);
        self.write_configuration(&mut config)?;
        debug!(project = %name, alias = %alias, "Removed alias");
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("store_dir", &self.store_dir().ok())
            .finish()
    }
}

/// Project names map directly to file names and must stay inside the store
fn validate_project_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AuthError::InvalidProjectName(name.to_string()));
    }
    Ok(())
}

fn project_name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(AUTH_CONFIG_EXTENSION)
        .map(str::to_string)
}

#[cfg(unix)]
fn create_store_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIRECTORY_MODE)
        .create(dir)
}

#[cfg(not(unix))]
fn create_store_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn has_owner_only_permissions(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode() & 0o777;
    mode & FILE_MODE == FILE_MODE && mode & 0o077 == 0
}

#[cfg(not(unix))]
fn has_owner_only_permissions(metadata: &fs::Metadata) -> bool {
    !metadata.permissions().readonly()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{ProjectToken, ALIAS_DEFAULT_TOKEN};
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::with_config_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_configuration_path() {
        let (store, dir) = test_store();
        let path = store.configuration_path("proj1").unwrap();
        assert_eq!(
            path,
            dir.path().join("intrinsic/projects/proj1.user-token")
        );
    }

    #[test]
    fn test_invalid_project_names() {
        let (store, _dir) = test_store();
        for name in ["", ".", "..", "a/b", "..\\x"] {
            assert!(matches!(
                store.configuration_path(name),
                Err(AuthError::InvalidProjectName(_))
            ));
            assert!(!store.has_configuration(name));
            assert!(matches!(
                store.get_configuration(name),
                Err(AuthError::InvalidProjectName(_))
            ));
            assert!(matches!(
                store.remove_configuration(name),
                Err(AuthError::InvalidProjectName(_))
            ));
        }

        let mut config = ProjectConfiguration::new("");
        assert!(matches!(
            store.write_configuration(&mut config),
            Err(AuthError::InvalidProjectName(_))
        ));
        assert!(config.last_updated.is_none());
    }

    #[test]
    fn test_write_and_get_roundtrip() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("key-123", None).unwrap();
        config
            .set_credentials("ci", "key-ci", Some(Utc::now() + Duration::days(1)))
            .unwrap();

        let before = Utc::now();
        store.write_configuration(&mut config).unwrap();

        let loaded = store.get_configuration("proj1").unwrap();
        assert_eq!(loaded.name, config.name);
        assert_eq!(loaded.tokens, config.tokens);
        assert!(loaded.last_updated.unwrap() >= before);
        assert_eq!(loaded.last_updated, config.last_updated);
    }

    #[test]
    fn test_end_to_end_default_credentials() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("key-123", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let reloaded = store.get_configuration("proj1").unwrap();
        let token = reloaded.get_default_credentials().unwrap();
        assert_eq!(token.api_key.expose(), "key-123");
        assert!(token.valid_until.is_none());
        assert!(token.validate().is_ok());
    }

    #[test]
    fn test_end_to_end_expired_token() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        let past = Utc::now() - Duration::hours(1);
        let _ = config.set_default_credentials("stale-key", Some(past));
        store.write_configuration(&mut config).unwrap();

        let reloaded = store.get_configuration("proj1").unwrap();
        let token = reloaded.get_default_credentials().unwrap();
        assert!(matches!(token.validate(), Err(AuthError::ExpiredToken(_))));

        let mut req = reqwest::Request::new(
            reqwest::Method::GET,
            reqwest::Url::parse("https://example.com/").unwrap(),
        );
        assert!(matches!(
            token.http_authorization(&mut req),
            Err(AuthError::ExpiredToken(_))
        ));
        assert_eq!(
            req.headers()
                .get(reqwest::header::AUTHORIZATION)
                .unwrap()
                .to_str()
                .unwrap(),
            "Bearer stale-key"
        );
    }

    #[test]
    fn test_written_file_format() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let contents = fs::read_to_string(store.configuration_path("proj1").unwrap()).unwrap();
        assert!(contents.starts_with("{\n  \"name\": \"proj1\",\n  \"tokens\": {\n    \"default\": {\n      \"apiKey\": \"k\"\n"));
        assert!(contents.contains("\"lastUpdated\": \""));
        assert!(!contents.contains("validUntil"));
        assert!(contents.ends_with("}\n"));
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_credentials("a", "first-key-that-is-long", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_credentials("b", "k2", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let loaded = store.get_configuration("proj1").unwrap();
        assert_eq!(loaded.aliases(), vec!["b"]);

        let entries: Vec<_> = fs::read_dir(store.store_dir().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_get_missing_configuration() {
        let (store, _dir) = test_store();
        let err = store.get_configuration("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_get_corrupted_configuration() {
        let (store, _dir) = test_store();
        let path = store.configuration_path("broken").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            store.get_configuration("broken"),
            Err(AuthError::DecodeError { .. })
        ));
    }

    #[test]
    fn test_get_backfills_tokens() {
        let (store, _dir) = test_store();
        let path = store.configuration_path("bare").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"name": "bare"}"#).unwrap();

        let config = store.get_configuration("bare").unwrap();
        assert!(config.tokens.is_empty());
        assert!(config.last_updated.is_none());
    }

    #[test]
    fn test_list_empty_store() {
        let (store, _dir) = test_store();
        assert!(store.list_configurations().unwrap().is_empty());
    }

    #[test]
    fn test_list_configurations() {
        let (store, _dir) = test_store();

        for name in ["a", "b"] {
            let mut config = ProjectConfiguration::new(name);
            config.set_default_credentials("k", None).unwrap();
            store.write_configuration(&mut config).unwrap();
        }
        fs::write(store.store_dir().unwrap().join("notes.txt"), "x").unwrap();

        let mut names = store.list_configurations().unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_list_with_glob_characters_in_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::with_config_dir(temp_dir.path().join("cfg[1]"));

        let mut config = ProjectConfiguration::new("p");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        assert_eq!(store.list_configurations().unwrap(), vec!["p"]);
    }

    #[test]
    fn test_remove_configuration_is_idempotent() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();
        assert!(store.has_configuration("proj1"));

        store.remove_configuration("proj1").unwrap();
        store.remove_configuration("proj1").unwrap();
        assert!(!store.has_configuration("proj1"));
        assert!(store.list_configurations().unwrap().is_empty());
    }

    #[test]
    fn test_remove_alias() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        config.set_credentials("ci", "k2", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        store.remove_alias("proj1", "ci").unwrap();

        let loaded = store.get_configuration("proj1").unwrap();
        assert_eq!(loaded.aliases(), vec![ALIAS_DEFAULT_TOKEN]);
        assert_eq!(
            loaded.get_default_credentials().unwrap(),
            &ProjectToken::new("k", None)
        );
    }

    #[test]
    fn test_remove_unknown_alias_still_rewrites() {
        let (store, _dir) = test_store();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();
        let first = store.get_configuration("proj1").unwrap().last_updated.unwrap();

        store.remove_alias("proj1", "nope").unwrap();

        let loaded = store.get_configuration("proj1").unwrap();
        assert_eq!(loaded.aliases(), vec![ALIAS_DEFAULT_TOKEN]);
        assert!(loaded.last_updated.unwrap() >= first);
    }

    #[test]
    fn test_get_uses_file_name_over_stored_name() {
        let (store, _dir) = test_store();
        let path = store.configuration_path("a").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"name": "b", "tokens": {"default": {"apiKey": "k"}, "x": {"apiKey": "kx"}}}"#,
        )
        .unwrap();

        let loaded = store.get_configuration("a").unwrap();
        assert_eq!(loaded.name, "a");

        store.remove_alias("a", "x").unwrap();

        let mut names = store.list_configurations().unwrap();
        names.sort();
        assert_eq!(names, vec!["a"]);
        let loaded = store.get_configuration("a").unwrap();
        assert_eq!(loaded.name, "a");
        assert_eq!(loaded.aliases(), vec![ALIAS_DEFAULT_TOKEN]);
    }

    #[test]
    fn test_write_fails_when_root_is_a_file() {
        use std::error::Error;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("not-a-dir");
        fs::write(&root, "x").unwrap();
        let store = Store::with_config_dir(&root);

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        let err = store.write_configuration(&mut config).unwrap_err();

        match &err {
            AuthError::CreateDirectory { name, .. } => assert_eq!(name, "proj1"),
            other => panic!("expected CreateDirectory, got {:?}", other),
        }
        assert!(err.source().is_some());
        // nothing was opened, so the stamp is untouched
        assert!(config.last_updated.is_none());
    }

    #[test]
    fn test_write_fails_when_target_is_a_directory() {
        use std::error::Error;

        let (store, _dir) = test_store();
        let path = store.configuration_path("proj1").unwrap();
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        let before = Utc::now();
        let err = store.write_configuration(&mut config).unwrap_err();

        match &err {
            AuthError::SyncConfiguration { name, .. } => assert_eq!(name, "proj1"),
            other => panic!("expected SyncConfiguration, got {:?}", other),
        }
        assert!(err.source().is_some());
        // stamped before the failed rename
        assert!(config.last_updated.unwrap() >= before);

        // the temporary file was cleaned up
        let entries: Vec<_> = fs::read_dir(store.store_dir().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_remove_alias_missing_configuration() {
        let (store, _dir) = test_store();
        let err = store.remove_alias("ghost", "default").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolver_is_consulted_per_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = Store::with_resolver(move || -> Result<PathBuf> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(root.clone())
        });

        store.list_configurations().unwrap();
        store.list_configurations().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolver_failure_propagates() {
        let store = Store::with_resolver(|| -> Result<PathBuf> {
            Err(AuthError::ConfigDirUnavailable("no home".to_string()))
        });
        assert!(matches!(
            store.list_configurations(),
            Err(AuthError::ConfigDirUnavailable(_))
        ));
        assert!(!store.has_configuration("p"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_and_directory_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = test_store();
        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let path = store.configuration_path("proj1").unwrap();
        let file_mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);

        let dir_mode = fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_has_configuration_rejects_wide_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = test_store();
        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();
        assert!(store.has_configuration("proj1"));

        let path = store.configuration_path("proj1").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!store.has_configuration("proj1"));
        // still loadable; the permission check is separate
        assert!(store.get_configuration("proj1").is_ok());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o400)).unwrap();
        assert!(!store.has_configuration("proj1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_restores_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = test_store();
        let mut config = ProjectConfiguration::new("proj1");
        config.set_default_credentials("k", None).unwrap();
        store.write_configuration(&mut config).unwrap();

        let path = store.configuration_path("proj1").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o666)).unwrap();

        store.write_configuration(&mut config).unwrap();
        assert!(store.has_configuration("proj1"));
    }
}
