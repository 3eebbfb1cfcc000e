//! Account configuration loading and resolution.
//!
//! The accounts file maps an alias to a region, an account id, and static
//! credential material. Discovery follows the standard search order (explicit
//! path override, user configuration directory, dotfile, project file); the
//! first file that exists wins. The resolved [`AccountProfile`] is immutable
//! for the life of the process and is threaded explicitly into every client
//! constructor rather than read from ambient process state.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::ConfigDiscovery;
use ortho_config::toml;
use serde::Deserialize;
use thiserror::Error;

const APP_NAME: &str = "drowse";
const CONFIG_ENV_VAR: &str = "DROWSE_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = "drowse.toml";
const DOTFILE_NAME: &str = ".drowse.toml";
const PROJECT_FILE_NAME: &str = "drowse.toml";

/// Environment variable naming the account alias to use for this invocation.
pub const ACCOUNT_ENV_VAR: &str = "DROWSE_ACCOUNT";

/// Static credential pair for one account entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AccountCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// One account entry in the accounts file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AccountEntry {
    /// Numeric account identifier, used when constructing function ARNs.
    pub account_id: String,
    /// Region hosting the instances and their scheduler rules.
    pub region: String,
    /// Marks the entry selected when no alias is supplied or cached.
    #[serde(default)]
    pub default: bool,
    /// Credential material for the account.
    pub credentials: AccountCredentials,
}

/// Parsed accounts file: entries keyed by alias.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct AccountsFile {
    /// Account entries keyed by alias.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountEntry>,
}

/// Resolved account material threaded through every remote client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccountProfile {
    /// Alias the profile was resolved from.
    pub alias: String,
    /// Numeric account identifier.
    pub account_id: String,
    /// Region for all control-plane calls.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

/// Errors raised while loading or resolving account configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No accounts file exists at any discovery candidate.
    #[error("no accounts file found; searched: {searched}")]
    NotFound {
        /// Candidate paths that were checked, in search order.
        searched: String,
    },
    /// File system access failed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// TOML parsing failed or the file has an unexpected shape.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// The requested alias has no entry.
    #[error("account '{alias}' is not defined in the accounts file")]
    UnknownAccount {
        /// Alias that was requested.
        alias: String,
    },
    /// No alias was supplied and no entry is marked as the default.
    #[error("no account selected; set {ACCOUNT_ENV_VAR} or mark one entry with default = true")]
    NoDefaultAccount,
    /// A required field on the selected entry is empty.
    #[error("missing configuration field: {0}")]
    MissingField(String),
}

/// Metadata for an account field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            toml_key,
        }
    }
}

fn require_field(value: &str, alias: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {} for account '{alias}': add {} to [accounts.{alias}] in {CONFIG_FILE_NAME}",
            metadata.description, metadata.toml_key
        )));
    }
    Ok(())
}

impl AccountEntry {
    /// Builds the immutable profile for this entry, validating that the
    /// region, account id, and both credential halves are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first empty field and
    /// where to set it.
    pub fn to_profile(&self, alias: &str) -> Result<AccountProfile, ConfigError> {
        require_field(
            &self.account_id,
            alias,
            &FieldMetadata::new("account id", "account_id"),
        )?;
        require_field(&self.region, alias, &FieldMetadata::new("region", "region"))?;
        require_field(
            &self.credentials.access_key_id,
            alias,
            &FieldMetadata::new("access key id", "credentials.access_key_id"),
        )?;
        require_field(
            &self.credentials.secret_access_key,
            alias,
            &FieldMetadata::new("secret access key", "credentials.secret_access_key"),
        )?;
        Ok(AccountProfile {
            alias: alias.to_owned(),
            account_id: self.account_id.trim().to_owned(),
            region: self.region.trim().to_owned(),
            access_key_id: self.credentials.access_key_id.trim().to_owned(),
            secret_access_key: self.credentials.secret_access_key.trim().to_owned(),
        })
    }
}

impl AccountsFile {
    /// Selects an entry: the explicit alias when given, otherwise the entry
    /// marked `default = true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAccount`] for an alias with no entry and
    /// [`ConfigError::NoDefaultAccount`] when nothing is selected and no
    /// entry is marked as the default.
    pub fn select(&self, alias: Option<&str>) -> Result<(&str, &AccountEntry), ConfigError> {
        if let Some(requested) = alias {
            return self
                .accounts
                .get_key_value(requested)
                .map(|(key, entry)| (key.as_str(), entry))
                .ok_or_else(|| ConfigError::UnknownAccount {
                    alias: requested.to_owned(),
                });
        }
        self.accounts
            .iter()
            .find(|(_, entry)| entry.default)
            .map(|(key, entry)| (key.as_str(), entry))
            .ok_or(ConfigError::NoDefaultAccount)
    }
}

/// Loads the accounts file using the standard discovery search order.
#[derive(Clone, Debug)]
pub struct AccountsLoader {
    discovery: ConfigDiscovery,
}

impl AccountsLoader {
    /// Builds a loader using the standard discovery settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            discovery: ConfigDiscovery::builder(APP_NAME)
                .env_var(CONFIG_ENV_VAR)
                .config_file_name(CONFIG_FILE_NAME)
                .dotfile_name(DOTFILE_NAME)
                .project_file_name(PROJECT_FILE_NAME)
                .build(),
        }
    }

    /// Builds a loader using an explicit discovery configuration.
    #[must_use]
    pub const fn with_discovery(discovery: ConfigDiscovery) -> Self {
        Self { discovery }
    }

    /// Reads and parses the first accounts file that exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no candidate exists, and
    /// [`ConfigError::Io`] or [`ConfigError::Parse`] when reading or parsing
    /// the winning candidate fails.
    pub fn load(&self) -> Result<AccountsFile, ConfigError> {
        let candidates = self.discovery.utf8_candidates();
        for candidate in &candidates {
            if path_exists(candidate)? {
                let contents = read_file(candidate)?;
                return toml::from_str(&contents).map_err(|err| ConfigError::Parse {
                    path: candidate.clone(),
                    message: err.to_string(),
                });
            }
        }
        let searched = candidates
            .iter()
            .map(Utf8PathBuf::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(ConfigError::NotFound { searched })
    }

    /// Loads the accounts file and resolves the profile for `alias`.
    ///
    /// # Errors
    ///
    /// Returns any [`ConfigError`] from loading, selection, or validation.
    pub fn resolve(&self, alias: Option<&str>) -> Result<AccountProfile, ConfigError> {
        let accounts = self.load()?;
        let (selected, entry) = accounts.select(alias)?;
        entry.to_profile(selected)
    }
}

impl Default for AccountsLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ConfigError::Parse {
        path: path.to_path_buf(),
        message: String::from("accounts file path is missing a filename"),
    })?;

    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ConfigError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, ConfigError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ConfigError::Parse {
        path: path.to_path_buf(),
        message: String::from("accounts file path is missing a filename"),
    })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;

    dir.read_to_string(file_name).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
