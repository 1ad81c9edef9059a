//! # guac-stack
//!
//! Compiles a small key-path configuration document into a Guacamole
//! deployment: a docker-compose topology, the nginx main and virtual host
//! configuration, and (with Let's Encrypt) a one-shot certificate bootstrap
//! script.
//!
//! Every artifact derives its host names from [`domain::site_domains`], so
//! the proxy always points at the certificate directory the bootstrap
//! script creates.
//!
//! ## Example
//!
//! ```rust,no_run
//! use guac_stack::{config::ConfigStore, config::types::Settings, synthesize};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ConfigStore::open(Path::new("guac-stack.json"))?;
//! let settings = Settings::from_store(&store)?;
//! let artifacts = synthesize(&settings)?;
//! artifacts.write_to(Path::new("."))?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod common;
pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod prompt;
pub mod provision;

pub use error::{Result, StackError};
pub use generator::{synthesize, Artifacts};

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
