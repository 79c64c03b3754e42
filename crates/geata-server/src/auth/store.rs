//! Token Store
//!
//! Durable single-record storage for the OAuth credential, a JSON file under
//! the user's home directory by default. Saves replace the whole record via
//! a temp-file rename so a crash never leaves a half-written token behind.
//!
//! A missing file and an unparseable file both read back as "no token", and
//! the caller re-enters the consent flow. Any other I/O failure is surfaced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::Credential;
use crate::common::{Error, Result};

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential, if any.
    pub fn load(&self) -> Result<Option<Credential>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::TokenStore(e)),
        };

        match serde_json::from_str(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token file unparseable, treating as absent");
                Ok(None)
            }
        }
    }

    /// Persist the credential, replacing any existing record in one step.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(Error::TokenStore)?;
        }

        let json = serde_json::to_vec_pretty(credential)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(Error::TokenStore)?;
        fs::rename(&tmp, &self.path).map_err(Error::TokenStore)?;

        info!(path = %self.path.display(), "token persisted");
        Ok(())
    }

    /// Delete the stored record. A no-op when nothing is stored.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "token deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::TokenStore(e)),
        }
    }
}
