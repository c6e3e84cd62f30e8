//! Platform-specific configuration paths.
//!
//! - **User config**: `~/.config/nodal/` (Linux), `~/Library/Application Support/nodal/` (macOS), `%APPDATA%\nodal\` (Windows)
//!
//! # Example
//!
//! ```rust,no_run
//! use nodal_config::paths;
//!
//! if let Some(path) = paths::find_config(None) {
//!     println!("Using config at: {:?}", path);
//! }
//! ```

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "nodal";

/// File name of the engine configuration.
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Config file looked up in the working directory before the user directory.
pub const LOCAL_CONFIG_FILE_NAME: &str = "nodal.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default location of the engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

/// Find the configuration file to use.
///
/// Searches in the following order:
/// 1. `explicit`, if given and it is a file
/// 2. `nodal.toml` in the current directory
/// 3. The user config directory
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    let user = default_config_path();
    user.is_file().then_some(user)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_user_config_dir() {
        let dir = user_config_dir();
        assert!(dir.to_string_lossy().contains("nodal"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("nodal/engine.toml"));
    }

    #[test]
    fn test_find_explicit_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "block_size = 128").unwrap();

        assert_eq!(find_config(Some(&path)), Some(path));
    }

    #[test]
    fn test_missing_explicit_config() {
        let found = find_config(Some(Path::new("/nonexistent/nodal/12345.toml")));
        assert!(found.is_none());
    }
}
