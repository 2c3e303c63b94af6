//! Configuration loader with multi-source merging

use crate::{ClusterAggConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "CAGG";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "CAGG")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip `~/.config/clusteragg/config.toml`
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    ///
    /// Environment keys use `__` between section and field, for example
    /// `CAGG_AGGREGATION__PORT=7070`.
    pub fn load(self) -> Result<ClusterAggConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = ClusterAggConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(toml_file(user_config_file));
                }
            }
        }

        // 3. Project config
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file));
        }

        // 4. Local overrides
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file));
        }

        // 5. Environment variables
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let cluster_config: ClusterAggConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cluster_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(cluster_config)
    }

    /// Load configuration or fall back to defaults
    pub fn load_or_default(self) -> ClusterAggConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        // A prefix no real environment sets keeps these tests hermetic.
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("CAGG_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.aggregation.port, 7065);
        assert_eq!(config.rebalance.max_parallel, 100);
        assert_eq!(config.rebalance.threshold, 500);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[aggregation]
host = "127.0.0.1"
port = 9000
min_connection_timeout_secs = 60

[rebalance]
max_parallel = 8
threshold = 3
"#;
        fs::write(project_dir.join("clusteragg.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.aggregation.host, "127.0.0.1");
        assert_eq!(config.aggregation.port, 9000);
        assert_eq!(config.aggregation.min_connection_timeout_secs, 60);
        // Untouched keys keep their defaults.
        assert_eq!(config.aggregation.max_connection_timeout_secs, 3600);
        assert_eq!(config.rebalance.max_parallel, 8);
        assert_eq!(config.rebalance.threshold, 3);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("clusteragg.toml"),
            "[aggregation]\nport = 9000\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("clusteragg.local.toml"),
            "[aggregation]\nport = 9999\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.aggregation.port, 9999);
    }

    #[test]
    fn test_invalid_values_fail_load() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("clusteragg.toml"),
            "[rebalance]\nthreshold = 1\n",
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("threshold"));
        assert_eq!(loader(project_dir).load_or_default().rebalance.threshold, 500);
    }

    // Environment overrides are not exercised here: the process environment
    // is shared between tests. In actual usage:
    //
    // CAGG_AGGREGATION__PORT=7070
    // CAGG_REBALANCE__MAX_PARALLEL=20
}
