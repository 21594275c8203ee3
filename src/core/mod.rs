//! Core modules for the serverless lifecycle, credential, and bridge
//! subsystem.

pub mod bridge;
pub mod credentials;
pub mod error;
pub mod hostinfo;
pub mod installer;
pub mod namespaces;
pub mod service;
pub mod status;
