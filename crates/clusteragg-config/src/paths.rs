//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "clusteragg.toml";

/// Local override file name, meant to stay out of version control.
pub const LOCAL_CONFIG_FILE: &str = "clusteragg.local.toml";

/// XDG-compliant paths for clusteragg
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("io", "clusteragg", "clusteragg"),
        }
    }

    /// User config directory (`~/.config/clusteragg/` on Linux)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("Failed to determine user config directory".to_string())
            })
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn user_paths_mention_clusteragg() {
        let paths = Paths::new();

        // Not every environment has a home directory.
        if let Ok(config_file) = paths.user_config_file() {
            assert!(config_file.to_string_lossy().contains("clusteragg"));
            assert!(config_file.ends_with("config.toml"));
        }
    }

    #[test]
    fn project_paths() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        assert_eq!(
            Paths::project_config_file(project_dir),
            project_dir.join("clusteragg.toml")
        );
        assert_eq!(
            Paths::local_config_file(project_dir),
            project_dir.join("clusteragg.local.toml")
        );
    }
}
