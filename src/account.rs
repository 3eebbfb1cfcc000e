//! Last-used account cache.
//!
//! The cache is a single plain-text file in the user's home directory holding
//! the alias of the most recently selected account. An alias supplied through
//! the environment is written back so later invocations without one reuse it.
//! Cache failures never fail a command; selection degrades to the accounts
//! file's default entry.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::warn;

const CACHE_FILE_NAME: &str = ".drowse-account";

/// Environment variable overriding the cache file location.
pub const CACHE_ENV_VAR: &str = "DROWSE_ACCOUNT_CACHE";

/// Errors raised while reading or writing the account cache.
#[derive(Debug, Error)]
pub enum AccountCacheError {
    /// `HOME` is unset, so the cache file cannot be located.
    #[error("HOME is not set; cannot locate {CACHE_FILE_NAME}")]
    HomeNotSet,
    /// File system access failed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Plain-text cache of the last-used account alias.
#[derive(Clone, Debug)]
pub struct AccountCache {
    path: Utf8PathBuf,
}

impl AccountCache {
    /// Builds a cache rooted at `$HOME/.drowse-account`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountCacheError::HomeNotSet`] when `HOME` is absent or
    /// not valid UTF-8.
    pub fn from_home() -> Result<Self, AccountCacheError> {
        let home = std::env::var("HOME").map_err(|_| AccountCacheError::HomeNotSet)?;
        Ok(Self::at(Utf8PathBuf::from(home).join(CACHE_FILE_NAME)))
    }

    /// Builds a cache at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the cached alias.
    ///
    /// A missing or blank cache file yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountCacheError::Io`] when the file exists but cannot be
    /// read.
    pub fn load(&self) -> Result<Option<String>, AccountCacheError> {
        let (parent, file_name) = self.split()?;
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AccountCacheError::Io {
                    path: parent.to_path_buf(),
                    message: err.to_string(),
                });
            }
        };
        match dir.read_to_string(file_name) {
            Ok(contents) => {
                let alias = contents.trim();
                if alias.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(alias.to_owned()))
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AccountCacheError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            }),
        }
    }

    /// Writes `alias` as the cached account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountCacheError::Io`] when the file cannot be written.
    pub fn save(&self, alias: &str) -> Result<(), AccountCacheError> {
        let (parent, file_name) = self.split()?;
        Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
            AccountCacheError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let dir =
            Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
                AccountCacheError::Io {
                    path: parent.to_path_buf(),
                    message: err.to_string(),
                }
            })?;
        dir.write(file_name, alias.trim())
            .map_err(|err| AccountCacheError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }

    fn split(&self) -> Result<(&Utf8Path, &str), AccountCacheError> {
        let parent = self.path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let file_name = self.path.file_name().ok_or_else(|| AccountCacheError::Io {
            path: self.path.clone(),
            message: String::from("cache path is missing a filename"),
        })?;
        Ok((parent, file_name))
    }
}

/// Determines the alias for this invocation and keeps the cache current.
///
/// An explicitly supplied alias wins and is written back to the cache so the
/// next invocation without one reuses it. Otherwise the cached alias, if
/// any, is used. Cache failures are logged and degrade to `None` rather than
/// failing the command.
#[must_use]
pub fn select_alias(cache: &AccountCache, supplied: Option<String>) -> Option<String> {
    if let Some(alias) = supplied {
        if let Err(err) = cache.save(&alias) {
            warn!(alias = %alias, error = %err, "failed to update account cache");
        }
        return Some(alias);
    }
    match cache.load() {
        Ok(cached) => cached,
        Err(err) => {
            warn!(error = %err, "failed to read account cache");
            None
        }
    }
}
