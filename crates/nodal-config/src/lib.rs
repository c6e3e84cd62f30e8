//! Configuration for the nodal engine.
//!
//! # Features
//!
//! - **Engine config**: queue capacities, cycle size and logging, from TOML
//! - **Paths**: Platform-specific config directory and file lookup
//!
//! # Example
//!
//! ```rust
//! use nodal_config::EngineConfig;
//!
//! let config = EngineConfig::from_toml("block_size = 128")?;
//! config.validate()?;
//! assert_eq!(config.block_size, 128);
//! # Ok::<(), nodal_config::ConfigError>(())
//! ```

mod engine_config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

pub use engine_config::{EngineConfig, LOG_LEVELS};
pub use error::ConfigError;
pub use paths::{default_config_path, ensure_user_config_dir, find_config, user_config_dir};
