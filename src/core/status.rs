//! Install-state classification for the local serverless toolchain.
//!
//! The install directory, its version marker, and the token-scoped
//! credentials file together form an implicit state machine. This
//! module makes that state explicit: observation (three filesystem
//! facts) is separated from derivation (a pure function), so the
//! classification logic is testable without I/O.

use crate::core::credentials::{self, CREDENTIALS_FILE};
use crate::core::error::ServerlessError;
use std::env;
use std::fs;
use std::path::Path;

/// Minimum required version of the toolchain bundle. The first part is
/// the version of the incorporated CLI and the second part is the
/// version of the bridge code in the bundle repository.
pub const MIN_SERVERLESS_VERSION: &str = "4.1.0-1.3.0";

/// Name of the plain-text version marker inside the install directory.
pub const VERSION_FILE: &str = "version";

/// Environment variable that overrides the minimum required version.
pub const MIN_VERSION_ENV: &str = "minServerlessVersion";

/// Classification of the local install, derived from three observed
/// facts. Variants are ordered by the first failing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// No install directory at all.
    Absent,
    /// Installed but below the minimum required version.
    Stale,
    /// Installed and current, but no credentials for this token.
    InstalledDisconnected,
    /// Installed, current, and connected.
    Ready,
}

impl InstallState {
    /// Map the classification onto the three user-actionable errors.
    pub fn into_result(self) -> Result<(), ServerlessError> {
        match self {
            InstallState::Absent => Err(ServerlessError::NotInstalled),
            InstallState::Stale => Err(ServerlessError::NeedsUpgrade),
            InstallState::InstalledDisconnected => Err(ServerlessError::NotConnected),
            InstallState::Ready => Ok(()),
        }
    }
}

/// Pure derivation: returns the first failing condition, in order.
pub fn derive_state(dir_exists: bool, version_ok: bool, creds_present: bool) -> InstallState {
    if !dir_exists {
        InstallState::Absent
    } else if !version_ok {
        InstallState::Stale
    } else if !creds_present {
        InstallState::InstalledDisconnected
    } else {
        InstallState::Ready
    }
}

/// Observe the filesystem and classify. Does not attempt repair.
pub fn observe_state(serverless_dir: &Path, leaf_creds_dir: &str) -> InstallState {
    derive_state(
        serverless_dir.exists(),
        serverless_uptodate(serverless_dir),
        is_connected(leaf_creds_dir, serverless_dir),
    )
}

/// Whether a credentials file exists under the token-scoped leaf. This
/// is a fast-fail check, not a validation of the credentials themselves.
pub fn is_connected(leaf_creds_dir: &str, serverless_dir: &Path) -> bool {
    credentials::credential_directory(leaf_creds_dir, serverless_dir)
        .join(CREDENTIALS_FILE)
        .exists()
}

/// Whether the installed toolchain is at least the required version.
pub fn serverless_uptodate(serverless_dir: &Path) -> bool {
    current_serverless_version(serverless_dir) >= min_serverless_version()
}

/// The version recorded in the install directory. Installs that predate
/// the versioning scheme have no marker and report "0", which compares
/// below any real version.
pub fn current_serverless_version(serverless_dir: &Path) -> String {
    match fs::read_to_string(serverless_dir.join(VERSION_FILE)) {
        Ok(contents) => contents,
        Err(_) => "0".to_string(),
    }
}

/// The minimum required version, overridable via environment for
/// operational flexibility.
pub fn min_serverless_version() -> String {
    match env::var(MIN_VERSION_ENV) {
        Ok(v) if !v.is_empty() => v,
        _ => MIN_SERVERLESS_VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derive_state_returns_first_failing_condition() {
        assert_eq!(derive_state(false, false, false), InstallState::Absent);
        assert_eq!(derive_state(false, true, true), InstallState::Absent);
        assert_eq!(derive_state(true, false, true), InstallState::Stale);
        assert_eq!(
            derive_state(true, true, false),
            InstallState::InstalledDisconnected
        );
        assert_eq!(derive_state(true, true, true), InstallState::Ready);
    }

    #[test]
    fn test_missing_version_marker_reads_as_zero() {
        let tmp = tempdir().unwrap();
        assert_eq!(current_serverless_version(tmp.path()), "0");
        assert!(!serverless_uptodate(tmp.path()));
    }

    #[test]
    fn test_version_comparison_is_lexical() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), MIN_SERVERLESS_VERSION).unwrap();
        assert!(serverless_uptodate(tmp.path()));
        fs::write(tmp.path().join(VERSION_FILE), "9.0.0-9.0.0").unwrap();
        assert!(serverless_uptodate(tmp.path()));
        fs::write(tmp.path().join(VERSION_FILE), "3.0.0-1.0.0").unwrap();
        assert!(!serverless_uptodate(tmp.path()));
    }

    #[test]
    fn test_observe_state_is_idempotent() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("sandbox");
        let first = observe_state(&dir, "tok1");
        let second = observe_state(&dir, "tok1");
        assert_eq!(first, InstallState::Absent);
        assert_eq!(first, second);
    }

    #[test]
    fn test_into_result_maps_to_guidance_errors() {
        assert!(matches!(
            InstallState::Absent.into_result(),
            Err(ServerlessError::NotInstalled)
        ));
        assert!(matches!(
            InstallState::Stale.into_result(),
            Err(ServerlessError::NeedsUpgrade)
        ));
        assert!(matches!(
            InstallState::InstalledDisconnected.into_result(),
            Err(ServerlessError::NotConnected)
        ));
        assert!(InstallState::Ready.into_result().is_ok());
    }
}
