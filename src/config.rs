//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.

use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    /// Root directory of the local object store.
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            data_dir: PathBuf::from(required_var("CLAIMQ_DATA_DIR")?),
            log_level: std::env::var("CLAIMQ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
