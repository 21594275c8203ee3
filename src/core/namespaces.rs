//! Namespace resolution against the control-plane API.
//!
//! Transport is injected through the `ControlPlane` trait so the
//! resolver can be exercised against hand-written doubles; the
//! production implementation is a thin blocking HTTP client that
//! attaches the caller's access token.

use crate::core::credentials::{Credential, Credentials};
use crate::core::error::ServerlessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix distinguishing new-style namespaces subject to the API-host
/// migration rule.
const MIGRATED_PREFIX: &str = "fn-";

/// The "namespace" member of the sandbox-assignment and namespaces
/// APIs. Only relevant fields are deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputNamespace {
    #[serde(default)]
    pub namespace: String,
    #[serde(default, rename = "api_host")]
    pub api_host: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "Region")]
    pub region: String,
}

/// Response body for namespace assignment, fetch, and creation.
#[derive(Debug, Default, Deserialize)]
pub struct NamespaceResponse {
    #[serde(default)]
    pub namespace: OutputNamespace,
}

/// Response body for the namespace list.
#[derive(Debug, Default, Deserialize)]
pub struct NamespaceListResponse {
    #[serde(default)]
    pub namespaces: Vec<OutputNamespace>,
}

#[derive(Debug, Serialize)]
struct NewNamespaceRequest {
    namespace: InputNamespace,
}

#[derive(Debug, Serialize)]
struct InputNamespace {
    label: String,
    #[serde(rename = "Region")]
    region: String,
}

/// Injected control-plane transport. The implementation is expected to
/// attach authentication; this subsystem only names methods and paths.
pub trait ControlPlane {
    fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ServerlessError>;
}

/// Blocking HTTP implementation of `ControlPlane` with bearer-token
/// authentication. No retry, no internal timeout.
pub struct HttpControlPlane {
    agent: ureq::Agent,
    base_url: String,
    access_token: String,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        HttpControlPlane {
            agent: ureq::Agent::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }
}

impl ControlPlane for HttpControlPlane {
    fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ServerlessError> {
        let url = format!("{}/{}", self.base_url, path);
        let request = self
            .agent
            .request(method, &url)
            .set("Authorization", &format!("Bearer {}", self.access_token));
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        }?;
        let text = response.into_string().map_err(ServerlessError::Io)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Returns the credentials of the one namespace implicitly assigned to
/// the caller's access token.
pub fn get_serverless_namespace(
    control_plane: &dyn ControlPlane,
) -> Result<Credentials, ServerlessError> {
    execute_namespace_request(control_plane, "POST", "v2/functions/sandbox", None)
}

/// Returns all namespaces visible to the access token.
pub fn list_namespaces(
    control_plane: &dyn ControlPlane,
) -> Result<NamespaceListResponse, ServerlessError> {
    let decoded = control_plane.send("GET", "v2/functions/namespaces", None)?;
    Ok(serde_json::from_value(decoded)?)
}

/// Returns the credentials of a specific namespace, given its name.
pub fn get_namespace(
    control_plane: &dyn ControlPlane,
    name: &str,
) -> Result<Credentials, ServerlessError> {
    let path = format!("v2/functions/namespaces/{}", name);
    execute_namespace_request(control_plane, "GET", &path, None)
}

/// Creates a new namespace from a label and region and returns its
/// credentials.
pub fn create_namespace(
    control_plane: &dyn ControlPlane,
    label: &str,
    region: &str,
) -> Result<Credentials, ServerlessError> {
    let body = serde_json::to_value(NewNamespaceRequest {
        namespace: InputNamespace {
            label: label.to_string(),
            region: region.to_string(),
        },
    })?;
    execute_namespace_request(control_plane, "POST", "v2/functions/namespaces", Some(body))
}

/// Deletes a namespace by name. The local credential cache is left
/// untouched.
pub fn delete_namespace(
    control_plane: &dyn ControlPlane,
    name: &str,
) -> Result<(), ServerlessError> {
    let path = format!("v2/functions/namespaces/{}", name);
    control_plane.send("DELETE", &path, None)?;
    Ok(())
}

/// Issue a request whose response is a `NamespaceResponse` and convert
/// it into a credentials record, applying the host-migration rule.
fn execute_namespace_request(
    control_plane: &dyn ControlPlane,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> Result<Credentials, ServerlessError> {
    let decoded: NamespaceResponse =
        serde_json::from_value(control_plane.send(method, path, body)?)?;
    let host = assign_api_host(&decoded.namespace.api_host, &decoded.namespace.namespace);
    let namespace = decoded.namespace.namespace;
    let credential = Credential {
        auth: format!("{}:{}", decoded.namespace.uuid, decoded.namespace.key),
    };
    Ok(Credentials {
        api_host: host.clone(),
        namespace: namespace.clone(),
        credentials: BTreeMap::from([(host, BTreeMap::from([(namespace, credential)]))]),
    })
}

/// Assign the correct API host based on the namespace name.
///
/// Every serverless cluster has two domain names, one ending in `.io`,
/// the other in `.co`. The control plane still returns the `.io` name,
/// but new-style namespaces (prefixed `fn-`) must use `.co`; during the
/// migration window old namespaces keep the host they were given. The
/// prefix check and suffix replacement must not drift or connectivity
/// for migrated namespaces silently breaks.
pub fn assign_api_host(orig_api_host: &str, namespace: &str) -> String {
    if namespace.starts_with(MIGRATED_PREFIX) {
        let host_parts: Vec<&str> = orig_api_host.split('.').collect();
        let sans_suffix = host_parts[..host_parts.len() - 1].join(".");
        format!("{}.co", sans_suffix)
    } else {
        orig_api_host.to_string()
    }
}
