use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use faropt_core::FarOptConfig;
use faropt_core::config::FarOptConfigBuilder;

#[derive(thiserror::Error, Debug)]
pub enum AppConfigError {
    #[error(transparent)]
    Config(#[from] faropt_core::config::ConfigError),
    #[error("Configuration file {0} does not exist")]
    MissingFile(PathBuf),
    #[error("Missing configuration directory")]
    MissingDirectory,
}

/// Overrides given on the command line. They win over the file and the environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub stack: Option<String>,
}

pub struct AppConfig {
    base_dir: PathBuf,
}

impl AppConfig {
    pub fn new() -> Result<Self, AppConfigError> {
        let proj_dirs =
            ProjectDirs::from("com", "faropt", "faropt").ok_or(AppConfigError::MissingDirectory)?;

        Ok(Self {
            base_dir: proj_dirs.config_dir().to_path_buf(),
        })
    }

    fn config_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Defaults, then the config file, then the environment, then `overrides`.
    pub fn load(&self, overrides: &ConfigOverrides) -> Result<FarOptConfig, AppConfigError> {
        load_config(
            &self.config_path(),
            overrides,
            |name| std::env::var(name).ok(),
        )
    }
}

fn load_config(
    default_path: &Path,
    overrides: &ConfigOverrides,
    var: impl Fn(&str) -> Option<String>,
) -> Result<FarOptConfig, AppConfigError> {
    let config = match &overrides.config_file {
        Some(path) if !path.exists() => return Err(AppConfigError::MissingFile(path.clone())),
        Some(path) => FarOptConfig::from_toml_file(path)?,
        None if default_path.exists() => FarOptConfig::from_toml_file(default_path)?,
        None => FarOptConfig::default(),
    };

    let mut builder = FarOptConfigBuilder::from_config(config.apply_vars(var));
    if let Some(endpoint) = &overrides.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(api_key) = &overrides.api_key {
        builder = builder.with_api_key(api_key);
    }
    if let Some(stack) = &overrides.stack {
        builder = builder.with_stack_name(stack);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_default_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(
            &dir.path().join("config.toml"),
            &ConfigOverrides::default(),
            no_env,
        )
        .unwrap();
        assert_eq!(config, FarOptConfig::default());
    }

    #[test]
    fn flags_beat_environment_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "endpoint = \"http://file:9080\"\nstack_name = \"from-file\"\nbucket = \"b\"\n",
        )
        .unwrap();

        let env = |name: &str| match name {
            "FAROPT_ENDPOINT" => Some("http://env:9080".to_string()),
            "FAROPT_STACK" => Some("from-env".to_string()),
            _ => None,
        };
        let overrides = ConfigOverrides {
            stack: Some("from-flag".to_string()),
            ..Default::default()
        };

        let config = load_config(&path, &overrides, env).unwrap();
        assert_eq!(config.endpoint, "http://env:9080");
        assert_eq!(config.stack_name, "from-flag");
        assert_eq!(config.bucket.as_deref(), Some("b"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            config_file: Some(dir.path().join("nope.toml")),
            ..Default::default()
        };
        assert!(matches!(
            load_config(&dir.path().join("config.toml"), &overrides, no_env),
            Err(AppConfigError::MissingFile(_))
        ));
    }
}
