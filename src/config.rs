//! Configuration for ea-import.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (EA_IMPORT_HOME)
//! 2. Config file (.ea-import/config.yaml)
//! 3. Defaults (~/.ea-import)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ea-import/config.yaml
//! - `paths.home` is relative to the .ea-import/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".ea-import";
const HOME_ENV: &str = "EA_IMPORT_HOME";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Session and ledger directory (relative to .ea-import/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_document_bytes: Option<usize>,
    pub execution_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the importer's state directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub limits: ImportLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLimits {
    pub max_document_bytes: usize,
    pub execution_timeout_seconds: u64,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024, // 10MB
            execution_timeout_seconds: 30 * 60,
        }
    }
}

impl ImportLimits {
    fn from_file(limits: Option<&LimitsConfig>) -> Self {
        let defaults = Self::default();
        Self {
            max_document_bytes: limits
                .and_then(|l| l.max_document_bytes)
                .unwrap_or(defaults.max_document_bytes),
            execution_timeout_seconds: limits
                .and_then(|l| l.execution_timeout_seconds)
                .unwrap_or(defaults.execution_timeout_seconds),
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }
}

impl ResolvedConfig {
    /// Directory holding one event stream per session
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    /// File the CLI's ledger gateway writes created objects to
    pub fn ledger_path(&self) -> PathBuf {
        self.home.join("ledger.jsonl")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);
    let env_home = std::env::var(HOME_ENV).ok().map(PathBuf::from);

    let config_file = find_config_file();

    let (home, limits) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        let config_dir = config_path.parent().unwrap_or(Path::new("."));

        let home = match (env_home, config.paths.home.as_deref()) {
            (Some(home), _) => home,
            (None, Some(home_path)) => resolve_path(config_dir, home_path),
            (None, None) => default_home,
        };

        (home, ImportLimits::from_file(config.limits.as_ref()))
    } else {
        (env_home.unwrap_or(default_home), ImportLimits::default())
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        limits,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
limits:
  execution_timeout_seconds: 90
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./state".to_string()));

        let limits = ImportLimits::from_file(config.limits.as_ref());
        assert_eq!(limits.execution_timeout_seconds, 90);
        assert_eq!(limits.max_document_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.execution_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_limits_default_without_section() {
        let config: ConfigFile = serde_yaml::from_str("version: \"1.0\"\n").unwrap();
        assert!(config.limits.is_none());
        assert_eq!(
            ImportLimits::from_file(config.limits.as_ref()),
            ImportLimits::default()
        );
    }

    #[test]
    fn test_derived_paths() {
        let config = ResolvedConfig {
            home: PathBuf::from("/test/.ea-import"),
            config_file: None,
            limits: ImportLimits::default(),
        };

        assert_eq!(config.sessions_dir(), PathBuf::from("/test/.ea-import/sessions"));
        assert_eq!(config.ledger_path(), PathBuf::from("/test/.ea-import/ledger.jsonl"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.ea-import");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./state"),
            PathBuf::from("/home/user/project/.ea-import/./state")
        );
    }
}
