//! The serverless service facade.
//!
//! Ties the installer, credential store, namespace resolver, and
//! subprocess bridge together behind one handle holding the resolved
//! paths and the injected control-plane transport. All operations are
//! synchronous; the connected auth context is initialized at most once
//! per service instance (`OnceLock`), and that initialization can run
//! on first use or eagerly via `connect`-style callers.

use crate::core::bridge::{self, ServerlessOutput};
use crate::core::credentials::{self, Credentials};
use crate::core::error::ServerlessError;
use crate::core::hostinfo::{self, ServerlessHostInfo};
use crate::core::installer;
use crate::core::namespaces::{self, ControlPlane, NamespaceListResponse};
use crate::core::status::{self, InstallState, min_serverless_version};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Environment variable relocating the toolchain install root. Needed
/// for snap installs, where the install area is snap-managed and not
/// user-writable; credentials stay relative to the usual directory.
pub const OVERRIDE_DIR_ENV: &str = "OVERRIDE_SANDBOX_DIR";

/// Auth context for the currently connected namespace.
#[derive(Debug, Clone)]
struct ConnectedContext {
    host: String,
    #[allow(dead_code)]
    auth: String,
}

pub struct ServerlessService {
    serverless_js: PathBuf,
    serverless_dir: PathBuf,
    creds_dir: PathBuf,
    leaf_creds_dir: String,
    node: PathBuf,
    user_agent: String,
    control_plane: Box<dyn ControlPlane>,
    connected: OnceLock<ConnectedContext>,
}

impl ServerlessService {
    /// Build a service rooted at `usual_serverless_dir` for the given
    /// token-scoped leaf. The install root honors the override
    /// environment variable; the credentials directory always derives
    /// from the usual location.
    pub fn new(
        control_plane: Box<dyn ControlPlane>,
        usual_serverless_dir: &Path,
        leaf_creds_dir: &str,
    ) -> Self {
        let serverless_dir = match env::var(OVERRIDE_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => usual_serverless_dir.to_path_buf(),
        };
        ServerlessService {
            serverless_js: serverless_dir.join("sandbox.js"),
            node: serverless_dir.join(installer::NODE_BIN),
            serverless_dir,
            creds_dir: credentials::credential_directory(leaf_creds_dir, usual_serverless_dir),
            leaf_creds_dir: leaf_creds_dir.to_string(),
            user_agent: format!(
                "doctl/{} serverless/{}",
                env!("CARGO_PKG_VERSION"),
                min_serverless_version()
            ),
            control_plane,
            connected: OnceLock::new(),
        }
    }

    /// Classify the local install; returns the first failing condition
    /// as its guidance error without attempting repair.
    pub fn check_serverless_status(&self) -> Result<(), ServerlessError> {
        self.install_state().into_result()
    }

    /// The explicit install-state classification.
    pub fn install_state(&self) -> InstallState {
        status::observe_state(&self.serverless_dir, &self.leaf_creds_dir)
    }

    /// Install or upgrade the toolchain under this service's root.
    pub fn install_serverless(&self, upgrading: bool) -> Result<(), ServerlessError> {
        installer::install_serverless(&self.serverless_dir, &self.leaf_creds_dir, upgrading)
    }

    /// Compose a toolchain invocation for the given action.
    pub fn cmd(&self, action: &str, args: &[String]) -> Command {
        bridge::command(
            &self.node,
            &self.serverless_js,
            &self.creds_dir,
            &self.user_agent,
            action,
            args,
        )
    }

    /// Run a composed invocation and parse its structured envelope.
    pub fn exec(&self, cmd: &mut Command) -> Result<ServerlessOutput, ServerlessError> {
        bridge::exec(cmd)
    }

    /// Run a composed invocation with pass-through output.
    pub fn stream(&self, cmd: &mut Command) -> Result<(), ServerlessError> {
        bridge::stream(cmd)
    }

    /// Credentials of the one namespace assigned to this access token.
    pub fn get_serverless_namespace(&self) -> Result<Credentials, ServerlessError> {
        namespaces::get_serverless_namespace(self.control_plane.as_ref())
    }

    pub fn list_namespaces(&self) -> Result<NamespaceListResponse, ServerlessError> {
        namespaces::list_namespaces(self.control_plane.as_ref())
    }

    pub fn get_namespace(&self, name: &str) -> Result<Credentials, ServerlessError> {
        namespaces::get_namespace(self.control_plane.as_ref(), name)
    }

    pub fn create_namespace(
        &self,
        label: &str,
        region: &str,
    ) -> Result<Credentials, ServerlessError> {
        namespaces::create_namespace(self.control_plane.as_ref(), label, region)
    }

    pub fn delete_namespace(&self, name: &str) -> Result<(), ServerlessError> {
        namespaces::delete_namespace(self.control_plane.as_ref(), name)
    }

    pub fn read_credentials(&self) -> Result<Credentials, ServerlessError> {
        credentials::read_credentials(&self.creds_dir)
    }

    /// Persist freshly resolved credentials, merging into any record
    /// already cached for this token.
    pub fn write_credentials(&self, creds: Credentials) -> Result<(), ServerlessError> {
        credentials::update_credentials(&self.creds_dir, creds)
    }

    pub fn get_host_info(&self, api_host: &str) -> Result<ServerlessHostInfo, ServerlessError> {
        hostinfo::get_host_info(api_host)
    }

    /// The API host of the currently connected namespace. The auth
    /// context is read from disk once and memoized; initialization
    /// failure always propagates rather than being silently dropped.
    pub fn get_connected_api_host(&self) -> Result<String, ServerlessError> {
        Ok(self.connected_context()?.host.clone())
    }

    fn connected_context(&self) -> Result<&ConnectedContext, ServerlessError> {
        if let Some(ctx) = self.connected.get() {
            return Ok(ctx);
        }
        let creds = self.read_credentials()?;
        let credential = creds.current().ok_or(ServerlessError::NotConnected)?;
        let ctx = ConnectedContext {
            host: creds.api_host.clone(),
            auth: credential.auth.clone(),
        };
        Ok(self.connected.get_or_init(|| ctx))
    }

    /// The token-scoped credentials directory this service operates on.
    pub fn credentials_dir(&self) -> &Path {
        &self.creds_dir
    }

    /// The resolved install root.
    pub fn serverless_dir(&self) -> &Path {
        &self.serverless_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::{Credential, Credentials};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    struct UnreachableControlPlane;

    impl ControlPlane for UnreachableControlPlane {
        fn send(
            &self,
            _method: &str,
            _path: &str,
            _body: Option<Value>,
        ) -> Result<Value, ServerlessError> {
            panic!("control plane should not be reached");
        }
    }

    fn service_at(root: &Path) -> ServerlessService {
        ServerlessService::new(Box::new(UnreachableControlPlane), &root.join("sandbox"), "tok1")
    }

    #[test]
    fn test_connected_host_requires_credentials() {
        let tmp = tempdir().unwrap();
        let service = service_at(tmp.path());
        assert!(matches!(
            service.get_connected_api_host(),
            Err(ServerlessError::Io(_))
        ));
    }

    #[test]
    fn test_connected_host_is_memoized_from_credentials() {
        let tmp = tempdir().unwrap();
        let service = service_at(tmp.path());
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
        service.write_credentials(creds).unwrap();

        assert_eq!(
            service.get_connected_api_host().unwrap(),
            "api.example.co"
        );
        // A second call answers from the memoized context.
        assert_eq!(
            service.get_connected_api_host().unwrap(),
            "api.example.co"
        );
    }

    #[test]
    fn test_disconnected_record_reports_not_connected() {
        let tmp = tempdir().unwrap();
        let service = service_at(tmp.path());
        let creds = Credentials {
            api_host: "api.example.co".to_string(),
            namespace: "fn-abc".to_string(),
            credentials: BTreeMap::new(),
        };
        service.write_credentials(creds).unwrap();
        assert!(matches!(
            service.get_connected_api_host(),
            Err(ServerlessError::NotConnected)
        ));
    }
}
