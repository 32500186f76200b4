//! HTTP server for the STRIDE threat-modeling pipeline
//!
//! Exposes upload, extraction, STRIDE and report endpoints over warp, plus
//! the CLI and logging setup used by the `stride-server` binary.

#![warn(unreachable_pub)]

pub mod cli;
pub mod error;
pub mod logging;
pub mod routes;

pub use cli::Cli;
pub use error::{handle_rejection, ApiError};
pub use routes::{routes, ComponentThreats, UploadQuery, FRONTEND_ORIGIN, MAX_UPLOAD_BYTES};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
