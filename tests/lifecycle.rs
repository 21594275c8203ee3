//! End-to-end filesystem scenarios for the install/connect lifecycle:
//! state classification on a fresh environment, and credential
//! preservation across the staging-then-rename upgrade swap.

use doctl_serverless::core::credentials::{
    self, CREDENTIALS_FILE, CREDS_DIR, Credential, Credentials, LEGACY_CREDS_DIR,
};
use doctl_serverless::core::error::ServerlessError;
use doctl_serverless::core::installer::preserve_credentials;
use doctl_serverless::core::status::{
    InstallState, MIN_SERVERLESS_VERSION, VERSION_FILE, observe_state,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const LEAF: &str = "tok1";

fn connected_record() -> Credentials {
    let mut creds = Credentials {
        api_host: "api.example.co".to_string(),
        namespace: "fn-abc".to_string(),
        credentials: BTreeMap::new(),
    };
    creds.credentials.insert(
        "api.example.co".to_string(),
        BTreeMap::from([(
            "fn-abc".to_string(),
            Credential {
                auth: "uuid:key".to_string(),
            },
        )]),
    );
    creds
}

/// Lay down the filesystem shape a successful fresh install produces:
/// install root, version marker, empty creds subtree.
fn simulate_fresh_install(serverless_dir: &Path) {
    fs::create_dir_all(serverless_dir.join(CREDS_DIR)).unwrap();
    fs::write(serverless_dir.join(VERSION_FILE), MIN_SERVERLESS_VERSION).unwrap();
    fs::write(serverless_dir.join("sandbox.js"), "// entry point").unwrap();
}

#[test]
fn test_fresh_environment_walks_through_states() {
    let tmp = tempfile::tempdir().unwrap();
    let serverless_dir = tmp.path().join("sandbox");

    // No install directory at all.
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Absent);
    assert!(matches!(
        observe_state(&serverless_dir, LEAF).into_result(),
        Err(ServerlessError::NotInstalled)
    ));

    // Installed at the required version, but no credentials yet.
    simulate_fresh_install(&serverless_dir);
    assert_eq!(
        observe_state(&serverless_dir, LEAF),
        InstallState::InstalledDisconnected
    );

    // Writing credentials to the token-scoped leaf completes the walk.
    let leaf_dir = credentials::credential_directory(LEAF, &serverless_dir);
    credentials::write_credentials(&leaf_dir, &connected_record()).unwrap();
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Ready);

    // And the classification is stable across repeated observation.
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Ready);
}

#[test]
fn test_stale_install_classifies_as_needs_upgrade() {
    let tmp = tempfile::tempdir().unwrap();
    let serverless_dir = tmp.path().join("sandbox");
    simulate_fresh_install(&serverless_dir);
    fs::write(serverless_dir.join(VERSION_FILE), "1.0.0-0.1.0").unwrap();
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Stale);
}

#[test]
fn test_install_predating_version_marker_is_stale() {
    let tmp = tempfile::tempdir().unwrap();
    let serverless_dir = tmp.path().join("sandbox");
    fs::create_dir_all(&serverless_dir).unwrap();
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Stale);
}

/// Drive the upgrade swap the way the installer does: preserve
/// credentials into staging, then remove-and-rename to activate.
fn activate_upgrade(serverless_dir: &Path, staging: &Path) {
    preserve_credentials(LEAF, staging, serverless_dir).unwrap();
    fs::remove_dir_all(serverless_dir).unwrap();
    fs::rename(staging, serverless_dir).unwrap();
}

#[test]
fn test_upgrade_preserves_new_style_credentials_unmodified() {
    let tmp = tempfile::tempdir().unwrap();
    let serverless_dir = tmp.path().join("sandbox");
    simulate_fresh_install(&serverless_dir);
    let leaf_dir = credentials::credential_directory(LEAF, &serverless_dir);
    credentials::write_credentials(&leaf_dir, &connected_record()).unwrap();
    let before = fs::read_to_string(leaf_dir.join(CREDENTIALS_FILE)).unwrap();

    // Staging holds the freshly extracted replacement bundle.
    let staging = tmp.path().join("sbx-install").join("sandbox");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join(VERSION_FILE), "9.9.9-9.9.9").unwrap();
    activate_upgrade(&serverless_dir, &staging);

    let after_path = credentials::credential_directory(LEAF, &serverless_dir)
        .join(CREDENTIALS_FILE);
    assert_eq!(fs::read_to_string(after_path).unwrap(), before);
    assert_eq!(observe_state(&serverless_dir, LEAF), InstallState::Ready);
}

#[test]
fn test_upgrade_converts_legacy_credentials_into_new_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let serverless_dir = tmp.path().join("sandbox");
    fs::create_dir_all(&serverless_dir).unwrap();
    fs::write(serverless_dir.join(VERSION_FILE), "1.0.0-0.1.0").unwrap();
    let legacy = serverless_dir.join(LEGACY_CREDS_DIR);
    fs::create_dir_all(&legacy).unwrap();
    fs::write(legacy.join(CREDENTIALS_FILE), "legacy-body").unwrap();

    let staging = tmp.path().join("sbx-install").join("sandbox");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join(VERSION_FILE), "9.9.9-9.9.9").unwrap();
    activate_upgrade(&serverless_dir, &staging);

    // The token-scoped leaf now exists under the new-style subtree,
    // containing the same file.
    let converted = credentials::credential_directory(LEAF, &serverless_dir)
        .join(CREDENTIALS_FILE);
    assert_eq!(fs::read_to_string(converted).unwrap(), "legacy-body");
}
