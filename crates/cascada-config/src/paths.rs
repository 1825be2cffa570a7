//! Platform-specific paths for configuration.
//!
//! - Linux: `~/.config/cascada/`
//! - macOS: `~/Library/Application Support/cascada/`
//! - Windows: `%APPDATA%\cascada\`

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "cascada";

/// File name of the default output configuration.
const CONFIG_FILE: &str = "output.toml";

/// Returns the user-specific configuration directory.
///
/// Falls back to the current directory if the platform config directory
/// cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the default output configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_app_name() {
        assert!(user_config_dir().ends_with(APP_NAME));
    }

    #[test]
    fn default_config_lives_in_config_dir() {
        let path = default_config_path();
        assert_eq!(path.parent(), Some(user_config_dir().as_path()));
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("output.toml"));
    }
}
