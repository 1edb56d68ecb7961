//! Configuration loader for the relay.
//!
//! Reads `relay.toml` from the data directory (`~/.relay/` in production)
//! and deserializes it into [`RelayConfig`]. A missing default file yields
//! the built-in defaults; a file that exists but does not parse is an error.
//!
//! Environment overrides are applied on top of the file:
//! `RELAY_BACKEND_URL`, `RELAY_BACKEND_MODEL` and `RELAY_BACKEND_API_KEY`.
//! The API key lives in a [`SecretString`] next to the config, never
//! inside it.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use relay_types::config::RelayConfig;
use relay_types::error::ConfigError;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "relay.toml";

pub const ENV_DATA_DIR: &str = "RELAY_DATA_DIR";
pub const ENV_BACKEND_URL: &str = "RELAY_BACKEND_URL";
pub const ENV_BACKEND_MODEL: &str = "RELAY_BACKEND_MODEL";
pub const ENV_BACKEND_API_KEY: &str = "RELAY_BACKEND_API_KEY";

/// A parsed configuration plus the values that must not be serialized.
pub struct LoadedConfig {
    pub config: RelayConfig,
    pub api_key: Option<SecretString>,
    /// Where the file was (or would have been) read from.
    pub path: PathBuf,
    /// False when no file existed and defaults were used.
    pub from_file: bool,
}

// Debug redacts the API key.
impl std::fmt::Debug for LoadedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedConfig")
            .field("config", &self.config)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("path", &self.path)
            .field("from_file", &self.from_file)
            .finish()
    }
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RELAY_DATA_DIR` environment variable
/// 2. `~/.relay`
/// 3. `.relay` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".relay");
    }

    PathBuf::from(".relay")
}

/// `{data_dir}/relay.toml`.
pub fn default_config_path() -> PathBuf {
    resolve_data_dir().join(CONFIG_FILE_NAME)
}

/// Load configuration from `path`, or from the default location when `None`.
///
/// An explicit path must exist. The default path may be absent, in which
/// case [`RelayConfig::default()`] is used. Environment overrides are
/// applied in both cases.
pub async fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let explicit = path.is_some();
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let (config, from_file) = match tokio::fs::read_to_string(&path).await {
        Ok(content) => (parse_config(&content)?, true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
            tracing::debug!("No {} found, using defaults", path.display());
            (RelayConfig::default(), false)
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };

    let mut loaded = LoadedConfig {
        config,
        api_key: None,
        path,
        from_file,
    };
    apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());
    loaded.config.validate()?;
    Ok(loaded)
}

pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    toml::from_str::<RelayConfig>(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply `RELAY_BACKEND_*` overrides using `lookup` to read variables.
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(loaded: &mut LoadedConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = lookup(ENV_BACKEND_URL) {
        tracing::debug!(%url, "backend url overridden from environment");
        loaded.config.backend.url = url;
    }
    if let Some(model) = lookup(ENV_BACKEND_MODEL) {
        tracing::debug!(%model, "backend model overridden from environment");
        loaded.config.backend.model = model;
    }
    if let Some(key) = lookup(ENV_BACKEND_API_KEY) {
        loaded.api_key = Some(SecretString::from(key));
    }
}

/// Render a config as TOML.
pub fn render_config(config: &RelayConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Write the default configuration to `path`, creating parent directories.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub async fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigError> {
    let write_err = |err: std::io::Error| ConfigError::Write {
        path: path.display().to_string(),
        reason: err.to_string(),
    };

    if !force && tokio::fs::try_exists(path).await.map_err(write_err)? {
        return Err(ConfigError::AlreadyExists(path.display().to_string()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let content = render_config(&RelayConfig::default())?;
    tokio::fs::write(path, content).await.map_err(write_err)?;
    tracing::info!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn loaded_default() -> LoadedConfig {
        LoadedConfig {
            config: RelayConfig::default(),
            api_key: None,
            path: PathBuf::from("relay.toml"),
            from_file: false,
        }
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            r#"
[backend]
model = "qwen2.5-7b"

[queue]
workers = 4
batch_size = 8

[conversation]
max_history = 6
"#,
        )
        .await
        .unwrap();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.path, path);
        assert_eq!(loaded.config.backend.model, "qwen2.5-7b");
        assert_eq!(loaded.config.queue.workers, 4);
        assert_eq!(loaded.config.queue.batch_size, 8);
        assert_eq!(loaded.config.conversation.max_history, 6);
        // Untouched sections keep their defaults.
        assert_eq!(loaded.config.cache.capacity, 1000);
        assert_eq!(loaded.config.server.port, 3000);
    }

    #[tokio::test]
    async fn load_config_missing_explicit_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");

        let err = load_config(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = load_config(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn load_config_wrong_type_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "[queue]\nworkers = \"many\"\n")
            .await
            .unwrap();

        assert!(matches!(
            load_config(Some(&path)).await,
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn load_config_rejects_zero_timer_periods() {
        let cases = [
            ("[queue]\nbatch_window_ms = 0\n", "queue.batch_window_ms"),
            ("[cache]\ncleanup_interval_secs = 0\n", "cache.cleanup_interval_secs"),
            ("[rate_limit]\nsweep_interval_secs = 0\n", "rate_limit.sweep_interval_secs"),
        ];
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);

        for (content, expected) in cases {
            tokio::fs::write(&path, content).await.unwrap();
            match load_config(Some(&path)).await {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn env_overrides_replace_backend_fields() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND_URL, "http://gpu-box:8080/v1/chat/completions"),
            (ENV_BACKEND_MODEL, "llama-3-8b"),
            (ENV_BACKEND_API_KEY, "sk-local"),
        ]);
        let mut loaded = loaded_default();
        apply_env_overrides(&mut loaded, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(
            loaded.config.backend.url,
            "http://gpu-box:8080/v1/chat/completions"
        );
        assert_eq!(loaded.config.backend.model, "llama-3-8b");
        assert_eq!(loaded.api_key.unwrap().expose_secret(), "sk-local");
    }

    #[test]
    fn env_overrides_ignore_empty_values() {
        let mut loaded = loaded_default();
        apply_env_overrides(&mut loaded, |k| {
            (k == ENV_BACKEND_MODEL || k == ENV_BACKEND_API_KEY).then(|| "  ".to_string())
        });

        assert_eq!(loaded.config.backend.model, "local-model");
        assert!(loaded.api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut loaded = loaded_default();
        loaded.api_key = Some(SecretString::from("sk-very-secret"));
        let rendered = format!("{loaded:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn write_default_config_round_trips_and_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);

        write_default_config(&path, false).await.unwrap();
        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.config.queue.workers, 10);
        assert_eq!(loaded.config.timeout.max_retries, 2);

        let err = write_default_config(&path, false).await.unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));

        write_default_config(&path, true).await.unwrap();
    }

    #[test]
    fn rendered_config_never_contains_api_key_field() {
        let rendered = render_config(&RelayConfig::default()).unwrap();
        assert!(rendered.contains("[backend]"));
        assert!(!rendered.contains("api_key"));
    }
}
