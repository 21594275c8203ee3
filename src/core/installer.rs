//! Install and upgrade of the local serverless toolchain.
//!
//! The toolchain is a bundle (entry-point script plus deployer code)
//! and a node interpreter, both downloaded as gzip tarballs and staged
//! in a temporary directory adjacent to the install root. Activation is
//! a remove-then-rename of the install directory: everything before
//! that point leaves the previous install intact, everything after it
//! runs against the new install and is surfaced, not rolled back.

use crate::core::credentials::{self, CREDS_DIR, LEGACY_CREDS_DIR};
use crate::core::error::ServerlessError;
use crate::core::status::min_serverless_version;
use colored::Colorize;
use flate2::read::GzDecoder;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Version of the node interpreter downloaded alongside the bundle.
pub const NODE_VERSION: &str = "v16.13.0";

/// Name of the interpreter binary inside the install directory.
pub const NODE_BIN: &str = "node";

/// Subdirectory the bundle tarball unpacks into within staging.
const BUNDLE_ROOT: &str = "sandbox";

/// Target platform in the naming scheme used by the node distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePlatform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl NodePlatform {
    /// Map the host OS/architecture onto node's distribution names.
    /// 32-bit linux is a hard failure; platforms whose node archives
    /// ship as zip rather than tar.gz are unsupported here.
    pub fn host() -> Result<NodePlatform, ServerlessError> {
        let os = match env::consts::OS {
            "linux" => "linux",
            "macos" => "darwin",
            other => return Err(ServerlessError::UnsupportedPlatform(other.to_string())),
        };
        let arch = match env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "x86" if os == "linux" => {
                return Err(ServerlessError::UnsupportedPlatform(
                    "32-bit linux".to_string(),
                ));
            }
            "x86" => "x86",
            other => return Err(ServerlessError::UnsupportedPlatform(other.to_string())),
        };
        Ok(NodePlatform { os, arch })
    }

    fn dist_dir(&self) -> String {
        format!("node-{}-{}-{}", NODE_VERSION, self.os, self.arch)
    }

    fn dist_url(&self) -> String {
        format!(
            "https://nodejs.org/dist/{}/{}.tar.gz",
            NODE_VERSION,
            self.dist_dir()
        )
    }
}

fn bundle_url() -> String {
    format!(
        "https://do-serverless-tools.nyc3.digitaloceanspaces.com/doctl-sandbox-{}.tar.gz",
        min_serverless_version()
    )
}

/// Common subroutine for both `install` and `upgrade`.
///
/// `leaf_creds_dir` is the token-scoped leaf name; `upgrading` selects
/// between creating a fresh credentials subtree and preserving the
/// existing one across the directory swap.
pub fn install_serverless(
    serverless_dir: &Path,
    leaf_creds_dir: &str,
    upgrading: bool,
) -> Result<(), ServerlessError> {
    // Staging must share a filesystem with the install directory so the
    // activation step is a rename, not a cross-device copy. The system
    // temp area gives no such guarantee.
    let parent = serverless_dir
        .parent()
        .ok_or_else(|| ServerlessError::Path(format!("{} has no parent", serverless_dir.display())))?;
    let tmp = tempfile::Builder::new()
        .prefix("sbx-install")
        .tempdir_in(parent)?
        .into_path();

    println!("{}", "Downloading...".bright_cyan());
    let platform = NodePlatform::host()?;

    // Download node only when it cannot be reused from the live install.
    let mut node_archive: Option<PathBuf> = None;
    if !upgrading || !can_reuse_node(serverless_dir) {
        let target = tmp.join("node-install.tar.gz");
        download(&platform.dist_url(), &target)?;
        node_archive = Some(target);
    }

    let bundle_archive = tmp.join("doctl-sandbox.tar.gz");
    download(&bundle_url(), &bundle_archive)?;

    println!("{}", "Unpacking...".bright_cyan());
    extract_tarball(&bundle_archive, &tmp)?;
    if let Some(archive) = &node_archive {
        extract_tarball(archive, &tmp)?;
    }

    println!("{}", "Installing...".bright_cyan());
    let staged = tmp.join(BUNDLE_ROOT);
    if upgrading {
        // The live install is about to be destroyed; move its
        // credentials (and, when reusable, its interpreter) into staging
        // so they survive the swap.
        preserve_credentials(leaf_creds_dir, &staged, serverless_dir)?;
        if node_archive.is_none() {
            move_existing_node(serverless_dir, &staged)?;
        }
    } else {
        fs::create_dir_all(staged.join(CREDS_DIR))?;
        fs::create_dir_all(serverless_dir)?;
    }

    // Activation point: before this a crash leaves the previous install
    // intact; after it the new install is live even if later steps fail.
    fs::remove_dir_all(serverless_dir)?;
    fs::rename(&staged, serverless_dir)?;

    if node_archive.is_some() {
        let unpacked = tmp.join(platform.dist_dir()).join("bin").join(NODE_BIN);
        fs::rename(unpacked, serverless_dir.join(NODE_BIN))?;
    }

    println!("{}", "Cleaning up...".bright_cyan());
    let _ = fs::remove_dir_all(&tmp);
    println!("{}", "Done".bright_green());
    Ok(())
}

/// Preserve the credentials of an install that is about to be replaced
/// by moving them into the staging directory. Falls back to converting
/// the legacy layout when no new-style subtree exists; any other rename
/// failure is fatal.
pub fn preserve_credentials(
    leaf_creds_dir: &str,
    staging_dir: &Path,
    serverless_dir: &Path,
) -> Result<(), ServerlessError> {
    let cred_path = serverless_dir.join(CREDS_DIR);
    let reloc_path = staging_dir.join(CREDS_DIR);
    match fs::rename(&cred_path, &reloc_path) {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
        Err(_) => {}
    }
    // No creds subtree. Convert the legacy location into the new layout
    // as part of preserving.
    let legacy_cred_path = serverless_dir.join(LEGACY_CREDS_DIR);
    fs::create_dir_all(&reloc_path)?;
    let move_legacy_to = credentials::credential_directory(leaf_creds_dir, staging_dir);
    fs::rename(legacy_cred_path, move_legacy_to)?;
    Ok(())
}

/// Whether the installed interpreter reports exactly the target version
/// and can therefore be carried over instead of re-downloaded. An
/// optimization only; any probe failure means "download".
pub fn can_reuse_node(serverless_dir: &Path) -> bool {
    let node = serverless_dir.join(NODE_BIN);
    match Command::new(node).arg("--version").output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim() == NODE_VERSION
        }
        _ => false,
    }
}

/// Move the reusable interpreter from the live install into staging.
fn move_existing_node(existing: &Path, staging: &Path) -> Result<(), ServerlessError> {
    fs::rename(existing.join(NODE_BIN), staging.join(NODE_BIN))?;
    Ok(())
}

/// Fetch a URL into a local file. Non-200 responses are a hard failure
/// with no retry.
fn download(url: &str, target_file: &Path) -> Result<(), ServerlessError> {
    let response = ureq::get(url).call().map_err(|err| match err {
        ureq::Error::Status(status, _) => ServerlessError::Download {
            status,
            url: url.to_string(),
        },
        other => ServerlessError::from(other),
    })?;
    let mut file = fs::File::create(target_file)?;
    io::copy(&mut response.into_reader(), &mut file)?;
    Ok(())
}

/// Unpack a gzip tarball into `dest`.
fn extract_tarball(archive: &Path, dest: &Path) -> Result<(), ServerlessError> {
    let file = fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    tarball.unpack(dest)?;
    Ok(())
}
