//! Courtload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by the Courtload workspace members.
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Environment**: typed lookups of environment variables with defaults
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use courtload_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> courtload_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
