//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/colloq/config.toml` (XDG user config)
//! 2. `./colloq.toml` (project-local)
//! 3. Environment (`COLLOQ_REDIS_URL`, `REDIS_URL`, `REDIS_HOST`/`REDIS_PORT`)
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ColloqConfig, ConfigError, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "colloq.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "colloq";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "COLLOQ_CONFIG_DIR";

/// Environment variable to override the data directory.
const DATA_DIR_ENV: &str = "COLLOQ_DATA_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    User,
    Project,
}

/// A config file that was looked for, and whether it contributed.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub loaded: bool,
}

/// Merged configuration plus what went into it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ColloqConfig,
    /// Lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Malformed files and plaintext secrets. Loading continues past both.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `COLLOQ_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = ColloqConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));

    let layers = user_config_path
        .map(|p| (LayerKind::User, p))
        .into_iter()
        .chain([(LayerKind::Project, project_path)]);
    for (kind, path) in layers {
        let loaded = merge_layer(&mut config, &path, &mut warnings);
        sources.push(ConfigSource { kind, path, loaded });
    }

    apply_env_overrides(&mut config);

    if let Some(ref llm) = config.llm
        && llm.has_plaintext_api_key()
    {
        warnings.push(format!(
            "[llm] contains a plaintext API key. Consider setting {} instead.",
            llm.api_key_env
        ));
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<ColloqConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    ColloqConfig::from_toml(&contents)
}

/// Get the XDG config file path for colloq.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for colloq.
///
/// Checks `COLLOQ_CONFIG_DIR` first, then the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory for local state such as the semantic index database.
///
/// `COLLOQ_DATA_DIR`, then the platform data dir, then `./.colloq`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".colloq"))
}

/// Apply environment overrides for the durable backend location.
///
/// `COLLOQ_REDIS_URL` wins over `REDIS_URL`, which wins over a URL composed
/// from `REDIS_HOST` and `REDIS_PORT` (port defaults to 6379).
pub fn apply_env_overrides(config: &mut ColloqConfig) {
    let url = env_non_empty("COLLOQ_REDIS_URL")
        .or_else(|| env_non_empty("REDIS_URL"))
        .or_else(|| {
            env_non_empty("REDIS_HOST").map(|host| {
                let port = env_non_empty("REDIS_PORT").unwrap_or_else(|| "6379".to_string());
                format!("redis://{host}:{port}")
            })
        });

    if let Some(url) = url {
        let mut storage = config.storage();
        storage.redis_url = Some(url);
        config.storage = Some(storage);
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Merge `path` into `config` if it exists and parses.
fn merge_layer(config: &mut ColloqConfig, path: &Path, warnings: &mut Vec<String>) -> bool {
    if !path.is_file() {
        return false;
    }
    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            true
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {e}", path.display()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn clear_redis_env() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            std::env::remove_var("COLLOQ_REDIS_URL");
            std::env::remove_var("REDIS_URL");
            std::env::remove_var("REDIS_HOST");
            std::env::remove_var("REDIS_PORT");
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[memory]\nmax_messages_per_session = 7\n").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.memory().max_messages_per_session, 7);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[serial]
    fn test_layered_merge_project_wins() {
        clear_redis_env();
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[storage]
redis_url = "redis://user:6379"

[compaction]
summarize_threshold = 10
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("colloq.toml"),
            r#"
[storage]
redis_url = "redis://project:6379"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert_eq!(
            loaded.config.storage().redis_url.as_deref(),
            Some("redis://project:6379")
        );
        assert_eq!(loaded.config.compaction().summarize_threshold, 10);
        assert_eq!(loaded.loaded_from().len(), 2);
        assert_eq!(loaded.sources[0].kind, LayerKind::User);
        assert_eq!(loaded.sources[1].kind, LayerKind::Project);
    }

    #[test]
    #[serial]
    fn test_no_files_gives_defaults() {
        clear_redis_env();
        let dir = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();

        let loaded = load_config_with_options(Some(dir.path()), Some(empty.path())).unwrap();
        assert!(loaded.config.storage.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    #[serial]
    fn test_malformed_config_warns_but_continues() {
        clear_redis_env();
        let dir = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        fs::write(dir.path().join("colloq.toml"), "not valid toml {{{{").unwrap();

        let loaded = load_config_with_options(Some(dir.path()), Some(empty.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    #[serial]
    fn test_plaintext_key_warning() {
        clear_redis_env();
        let dir = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        fs::write(dir.path().join("colloq.toml"), "[llm]\napi_key = \"sk-secret\"\n").unwrap();

        let loaded = load_config_with_options(Some(dir.path()), Some(empty.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }

    #[test]
    #[serial]
    fn test_env_redis_host_and_port() {
        clear_redis_env();
        unsafe {
            std::env::set_var("REDIS_HOST", "cache.internal");
            std::env::set_var("REDIS_PORT", "6380");
        }

        let mut config = ColloqConfig::new();
        apply_env_overrides(&mut config);
        assert_eq!(
            config.storage().redis_url.as_deref(),
            Some("redis://cache.internal:6380")
        );
        clear_redis_env();
    }

    #[test]
    #[serial]
    fn test_env_url_precedence() {
        clear_redis_env();
        unsafe {
            std::env::set_var("REDIS_HOST", "ignored");
            std::env::set_var("REDIS_URL", "redis://generic:6379");
            std::env::set_var("COLLOQ_REDIS_URL", "redis://specific:6379/2");
        }

        let mut config = ColloqConfig::new();
        apply_env_overrides(&mut config);
        assert_eq!(
            config.storage().redis_url.as_deref(),
            Some("redis://specific:6379/2")
        );
        clear_redis_env();
    }

    #[test]
    #[serial]
    fn test_env_override_keeps_other_storage_fields() {
        clear_redis_env();
        unsafe {
            std::env::set_var("REDIS_URL", "redis://env:6379");
        }

        let mut config = ColloqConfig::from_toml("[storage]\nsession_prefix = \"chat:\"\n").unwrap();
        apply_env_overrides(&mut config);
        let storage = config.storage();
        assert_eq!(storage.session_prefix, "chat:");
        assert_eq!(storage.redis_url.as_deref(), Some("redis://env:6379"));
        clear_redis_env();
    }
}
