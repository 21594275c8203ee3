//! Read-only query against a serverless cluster's runtime catalog.
//! Used by callers to validate that a deployment's runtime kind is
//! actually supported by the target host.

use crate::core::error::ServerlessError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A runtime entry as returned by the API host controller. Only
/// relevant fields are deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerlessRuntime {
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub kind: String,
}

/// Host information returned by the API host controller, keyed by
/// language kind.
#[derive(Debug, Default, Deserialize)]
pub struct ServerlessHostInfo {
    #[serde(default)]
    pub runtimes: BTreeMap<String, Vec<ServerlessRuntime>>,
}

/// Fetch the runtime catalog of the given API host. Unauthenticated;
/// transport and parse errors propagate directly.
pub fn get_host_info(api_host: &str) -> Result<ServerlessHostInfo, ServerlessError> {
    let endpoint = format!("{}/api/v1", api_host);
    let response = ureq::get(&endpoint).call()?;
    let body = response.into_string().map_err(ServerlessError::Io)?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_info_decodes_runtime_catalog() {
        let body = r#"{
            "runtimes": {
                "nodejs": [
                    {"kind": "nodejs:14", "deprecated": true},
                    {"kind": "nodejs:18", "default": true}
                ],
                "python": [
                    {"kind": "python:3.9"}
                ]
            }
        }"#;
        let info: ServerlessHostInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.runtimes.len(), 2);
        let node = &info.runtimes["nodejs"];
        assert!(node[0].deprecated);
        assert!(node[1].default);
        assert_eq!(info.runtimes["python"][0].kind, "python:3.9");
    }
}
