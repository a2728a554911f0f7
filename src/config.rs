//! Configuration for casebench paths and the remote store.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CASEBENCH_HOME, CASEBENCH_DATA,
//!    CASEBENCH_REMOTE_URL, CASEBENCH_ANON_KEY)
//! 2. Config file (.casebench/config.yaml)
//! 3. Defaults (~/.casebench)
//!
//! Config file discovery:
//! - Searches current directory and parents for .casebench/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::store::supabase::SupabaseConfig;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub remote: Option<SupabaseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Session-state directory (relative to config file)
    pub home: Option<String>,
    /// Normalized record files (relative to config file)
    pub data: Option<String>,
    /// Evaluation plan file (relative to config file)
    pub plan: Option<String>,
    /// Dedicated chain-of-thought file (relative to config file)
    pub cot_file: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to casebench home (cache, default plan location)
    pub home: PathBuf,
    /// Directory holding the normalized record files
    pub data_dir: PathBuf,
    /// Evaluation plan file
    pub plan_path: PathBuf,
    /// Dedicated chain-of-thought file (if configured)
    pub cot_file: Option<PathBuf>,
    /// Remote store credentials (if configured)
    pub remote: Option<SupabaseConfig>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory for per-rater cache files ($CASEBENCH_HOME/cache)
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Remote credentials, only when complete enough to connect with.
    pub fn usable_remote(&self) -> Option<&SupabaseConfig> {
        self.remote
            .as_ref()
            .filter(|r| !r.url.is_empty() && !r.anon_key.is_empty())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".casebench").join("config.yaml");
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

/// Resolve a path that may be relative to the config file's parent
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

/// Overlay environment credentials onto the configured remote. A URL from
/// the environment can stand alone; a key without any URL has nothing to
/// attach to and is ignored.
fn merge_remote(
    configured: Option<SupabaseConfig>,
    env_url: Option<String>,
    env_key: Option<String>,
) -> Option<SupabaseConfig> {
    let mut remote = match env_url {
        Some(url) => Some(match configured {
            Some(mut r) => {
                r.url = url;
                r
            }
            None => SupabaseConfig::new(url, ""),
        }),
        None => configured,
    };
    if let (Some(r), Some(key)) = (remote.as_mut(), env_key) {
        r.anon_key = key;
    }
    remote
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".casebench");

    // Check for config file
    let config_file = find_config_file();

    let (home, data_dir, plan_path, cot_file, remote) = if let Some(ref config_path) = config_file
    {
        // Config file found - use it as base
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .casebench/ (i.e., grandparent of config.yaml)
        let base_dir = config_path
            .parent() // .casebench/
            .and_then(|p| p.parent()) // project root
            .unwrap_or(Path::new("."));

        // Resolve home path
        let home = if let Ok(env_home) = std::env::var("CASEBENCH_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to .casebench/ directory
            let casebench_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(casebench_dir, home_path)
        } else {
            default_home.clone()
        };

        // Resolve data directory
        let data_dir = if let Ok(env_data) = std::env::var("CASEBENCH_DATA") {
            PathBuf::from(env_data)
        } else if let Some(ref data_path) = config.paths.data {
            resolve_path(base_dir, data_path)
        } else {
            home.join("data")
        };

        let plan_path = match config.paths.plan {
            Some(ref plan) => resolve_path(base_dir, plan),
            None => home.join("plan.yaml"),
        };

        let cot_file = config
            .paths
            .cot_file
            .as_ref()
            .map(|p| resolve_path(base_dir, p));

        let remote = merge_remote(
            config.remote,
            std::env::var("CASEBENCH_REMOTE_URL").ok(),
            std::env::var("CASEBENCH_ANON_KEY").ok(),
        );

        (home, data_dir, plan_path, cot_file, remote)
    } else {
        // No config file - use env vars or defaults
        let home = std::env::var("CASEBENCH_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let data_dir = std::env::var("CASEBENCH_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("data"));

        let plan_path = home.join("plan.yaml");

        let remote = merge_remote(
            None,
            std::env::var("CASEBENCH_REMOTE_URL").ok(),
            std::env::var("CASEBENCH_ANON_KEY").ok(),
        );

        (home, data_dir, plan_path, None, remote)
    };

    Ok(ResolvedConfig {
        home,
        data_dir,
        plan_path,
        cot_file,
        remote,
        config_file,
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

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the casebench home directory.
pub fn casebench_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the per-rater cache directory ($CASEBENCH_HOME/cache)
pub fn cache_dir() -> Result<PathBuf> {
    Ok(config()?.cache_dir())
}

/// Get the normalized record directory.
pub fn data_dir() -> Result<PathBuf> {
    Ok(config()?.data_dir.clone())
}

/// Get the evaluation plan path.
pub fn plan_path() -> Result<PathBuf> {
    Ok(config()?.plan_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let casebench_dir = temp.path().join(".casebench");
        std::fs::create_dir_all(&casebench_dir).unwrap();

        let config_path = casebench_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  data: ../data
  plan: ../plan.yaml
remote:
  url: https://example.supabase.co
  anon_key: KEY
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));
        assert_eq!(config.paths.data, Some("../data".to_string()));
        assert_eq!(config.paths.cot_file, None);

        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "https://example.supabase.co");
        assert_eq!(remote.table, "ratings");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "../sibling"),
            PathBuf::from("/home/user/project/../sibling")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_remote_merge_precedence() {
        // Environment URL alone can stand up a remote.
        let remote = merge_remote(None, Some("https://env.supabase.co".into()), Some("EK".into()))
            .unwrap();
        assert_eq!(remote.url, "https://env.supabase.co");
        assert_eq!(remote.anon_key, "EK");
        assert_eq!(remote.table, "ratings");

        // Environment overrides the file, field by field.
        let configured = SupabaseConfig::new("https://file.supabase.co", "FK");
        let remote = merge_remote(Some(configured.clone()), None, Some("EK".into())).unwrap();
        assert_eq!(remote.url, "https://file.supabase.co");
        assert_eq!(remote.anon_key, "EK");

        // A key with nothing to attach to is ignored.
        assert!(merge_remote(None, None, Some("EK".into())).is_none());

        // No environment leaves the file config untouched.
        let remote = merge_remote(Some(configured), None, None).unwrap();
        assert_eq!(remote.anon_key, "FK");
    }

    #[test]
    fn test_incomplete_remote_is_not_usable() {
        let resolved = ResolvedConfig {
            home: PathBuf::from("/test/.casebench"),
            data_dir: PathBuf::from("/test/data"),
            plan_path: PathBuf::from("/test/plan.yaml"),
            cot_file: None,
            remote: Some(SupabaseConfig::new("https://example.supabase.co", "")),
            config_file: None,
        };
        assert!(resolved.usable_remote().is_none());
        assert_eq!(resolved.cache_dir(), PathBuf::from("/test/.casebench/cache"));

        let resolved = ResolvedConfig {
            remote: Some(SupabaseConfig::new("https://example.supabase.co", "KEY")),
            ..resolved
        };
        assert!(resolved.usable_remote().is_some());
    }
}
