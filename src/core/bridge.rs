//! Subprocess bridge into the installed toolchain.
//!
//! The toolchain is invoked as `node <entry-point> <action> <args...>`
//! with the token-scoped credentials directory and a user-agent string
//! injected through the environment. Stdout is the sole structured
//! channel: it carries one JSON envelope per invocation. Stderr is
//! suppressed unless the `DEBUG` environment variable is set.

use crate::core::error::ServerlessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::path::Path;
use std::process::{Command, Stdio};

/// Environment variable naming the token-scoped credentials directory
/// for the toolchain subprocess.
pub const ENV_CREDS_DIR: &str = "NIMBELLA_DIR";

/// Environment variable carrying the user-agent string used for request
/// attribution by the downstream toolchain.
pub const ENV_USER_AGENT: &str = "NIM_USER_AGENT";

/// The structured envelope a toolchain invocation emits on stdout.
/// A non-empty `error` means the operation failed even though the other
/// fields may still carry partial, inspectable results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerlessOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table: Vec<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captured: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formatted: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub entity: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Compose the command for one toolchain action.
pub fn command(
    node: &Path,
    serverless_js: &Path,
    creds_dir: &Path,
    user_agent: &str,
    action: &str,
    args: &[String],
) -> Command {
    let mut cmd = Command::new(node);
    cmd.arg(serverless_js).arg(action).args(args);
    cmd.env(ENV_CREDS_DIR, creds_dir);
    cmd.env(ENV_USER_AGENT, user_agent);
    // Stdout stays reserved for the structured envelope; stderr is only
    // opened up for diagnostics when DEBUG is set.
    if env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false) {
        cmd.stderr(Stdio::inherit());
    } else {
        cmd.stderr(Stdio::null());
    }
    cmd
}

/// Run a composed command to completion and parse its stdout as an
/// envelope. A non-zero exit is not itself an error: the toolchain uses
/// exit status as a secondary indicator and the envelope stays
/// trustworthy, with error information carried inline. A non-empty
/// `error` field fails the call while keeping the envelope available
/// through the error itself.
pub fn exec(cmd: &mut Command) -> Result<ServerlessOutput, ServerlessError> {
    let output = cmd.stdout(Stdio::piped()).output()?;
    let result: ServerlessOutput = serde_json::from_slice(&output.stdout)?;
    if !result.error.is_empty() {
        return Err(ServerlessError::Tool {
            message: result.error.clone(),
            output: Box::new(result),
        });
    }
    Ok(result)
}

/// Run a composed command letting output pass through unparsed. Used
/// when structured results are not needed.
pub fn stream(cmd: &mut Command) -> Result<(), ServerlessError> {
    let status = cmd.stdout(Stdio::inherit()).status()?;
    if !status.success() {
        return Err(ServerlessError::Command(status));
    }
    Ok(())
}
