use crate::core::bridge::ServerlessOutput;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerlessError {
    #[error("Serverless support is not installed (use `doctl serverless install`)")]
    NotInstalled,
    #[error("Serverless support needs to be upgraded (use `doctl serverless upgrade`)")]
    NeedsUpgrade,
    #[error(
        "Serverless support is installed but not connected to a functions namespace (use `doctl serverless connect`)"
    )]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(Box<ureq::Error>),
    #[error("Received status code {status} attempting to download from {url}")]
    Download { status: u16, url: String },
    #[error("serverless support is not available for {0}")]
    UnsupportedPlatform(String),
    #[error("command failed: {0}")]
    Command(std::process::ExitStatus),
    /// The toolchain subprocess emitted a structurally valid envelope whose
    /// `error` field is set. Partial results stay inspectable via `output`.
    #[error("{message}")]
    Tool {
        message: String,
        output: Box<ServerlessOutput>,
    },
    #[error("Path error: {0}")]
    Path(String),
}

impl From<ureq::Error> for ServerlessError {
    fn from(err: ureq::Error) -> Self {
        ServerlessError::Transport(Box::new(err))
    }
}
