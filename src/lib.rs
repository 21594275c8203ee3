//! doctl-serverless: management layer for a locally installed
//! serverless toolchain.
//!
//! This crate governs three intertwined responsibilities:
//!
//! - **Toolchain lifecycle**: downloading, verifying, and atomically
//!   installing or upgrading the versioned toolchain bundle and its
//!   node interpreter, preserving credentials across upgrades
//!   (`core::installer`, `core::status`).
//! - **Namespace credentials**: resolving namespaces against the
//!   control plane, applying the API-host migration rule, and caching
//!   auth secrets in a token-scoped directory (`core::namespaces`,
//!   `core::credentials`).
//! - **Subprocess bridge**: invoking the installed toolchain and
//!   parsing its structured JSON envelope, distinguishing
//!   toolchain-reported errors from execution failures
//!   (`core::bridge`).
//!
//! Everything hangs off `core::service::ServerlessService`, which holds
//! the resolved paths and the injected control-plane transport. All
//! operations are synchronous and blocking; install/upgrade against the
//! same root must not run concurrently (single-flight is the caller's
//! job).

pub mod cli;
pub mod core;

pub use cli::run;
