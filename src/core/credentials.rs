//! On-disk credential store for serverless namespaces.
//!
//! Credentials are cached under a token-scoped leaf directory,
//! `<serverless_dir>/creds/<token_prefix>/credentials.json`, so that
//! several authenticated identities can coexist under one install.
//! The file is also read by the toolchain subprocess, which is pointed
//! at the leaf directory via `NIMBELLA_DIR` (see `core::bridge`).

use crate::core::error::ServerlessError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory under the install root where all credentials are stored.
/// It has one subdirectory per access token (a prefix of the token).
pub const CREDS_DIR: &str = "creds";

/// Name of the file where namespace credentials are persisted.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Legacy credential location used by installs that predate the
/// `creds/<token>` layout. Only consulted during upgrade preservation.
pub const LEGACY_CREDS_DIR: &str = ".nimbella";

/// The persisted credentials record. `api_host`/`namespace` name the
/// currently connected pair; `credentials` caches one auth secret per
/// (host, namespace) so reconnecting does not require a control-plane
/// round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "currentHost")]
    pub api_host: String,
    #[serde(rename = "currentNamespace")]
    pub namespace: String,
    pub credentials: BTreeMap<String, BTreeMap<String, Credential>>,
}

/// A single cached auth secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "api_key")]
    pub auth: String,
}

impl Credentials {
    /// Fold `fresh` into this record: the current host/namespace move to
    /// the fresh pair, and the fresh secrets are inserted without
    /// discarding entries cached for other hosts or namespaces.
    pub fn merge(&mut self, fresh: Credentials) {
        self.api_host = fresh.api_host;
        self.namespace = fresh.namespace;
        for (host, namespaces) in fresh.credentials {
            let entry = self.credentials.entry(host).or_default();
            for (namespace, credential) in namespaces {
                entry.insert(namespace, credential);
            }
        }
    }

    /// The secret for the currently connected (host, namespace) pair,
    /// if the record is actually connected.
    pub fn current(&self) -> Option<&Credential> {
        self.credentials.get(&self.api_host)?.get(&self.namespace)
    }
}

/// Returns the token-scoped directory holding `credentials.json`.
pub fn credential_directory(leaf_dir: &str, serverless_dir: &Path) -> PathBuf {
    serverless_dir.join(CREDS_DIR).join(leaf_dir)
}

/// Persist a credentials record, creating the containing directory
/// first. The directory and file are owner-only.
pub fn write_credentials(creds_dir: &Path, creds: &Credentials) -> Result<(), ServerlessError> {
    fs::create_dir_all(creds_dir)?;
    restrict_permissions(creds_dir, 0o700)?;
    let path = creds_dir.join(CREDENTIALS_FILE);
    let body = serde_json::to_string_pretty(creds)?;
    fs::write(&path, body)?;
    restrict_permissions(&path, 0o600)?;
    Ok(())
}

/// Load the credentials record from the token-scoped directory. I/O and
/// parse errors surface directly; no fallback record is synthesized.
pub fn read_credentials(creds_dir: &Path) -> Result<Credentials, ServerlessError> {
    let path = creds_dir.join(CREDENTIALS_FILE);
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

/// Merge `fresh` into whatever record is already on disk and persist
/// the result. A missing file starts a new record; any other read
/// failure propagates.
pub fn update_credentials(creds_dir: &Path, fresh: Credentials) -> Result<(), ServerlessError> {
    let merged = match read_credentials(creds_dir) {
        Ok(mut existing) => {
            existing.merge(fresh);
            existing
        }
        Err(ServerlessError::Io(err)) if err.kind() == io::ErrorKind::NotFound => fresh,
        Err(err) => return Err(err),
    };
    write_credentials(creds_dir, &merged)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), ServerlessError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), ServerlessError> {
    Ok(())
}
