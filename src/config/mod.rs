mod file_config;

pub use file_config::FileConfig;

use crate::resolver::{DEFAULT_MAX_DEPTH, DEFAULT_USER_AGENT};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 300;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub max_playlist_depth: usize,
    pub http_timeout_sec: u64,
    pub user_agent: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_file: None,
            output_dir: None,
            max_playlist_depth: DEFAULT_MAX_DEPTH,
            http_timeout_sec: DEFAULT_HTTP_TIMEOUT_SEC,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_file: PathBuf,
    /// Where downloaded audio lands.
    pub output_dir: PathBuf,
    pub max_playlist_depth: usize,
    pub http_timeout_sec: u64,
    pub user_agent: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_file = file
            .db_file
            .map(PathBuf::from)
            .or_else(|| cli.db_file.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_file must be specified via --db-file or in config file")
            })?;

        if db_file.is_dir() {
            bail!("db_file is a directory: {:?}", db_file);
        }

        let output_dir = file
            .output_dir
            .map(PathBuf::from)
            .or_else(|| cli.output_dir.clone())
            .unwrap_or_else(|| parent_dir(&db_file));

        if !output_dir.exists() {
            bail!("Output directory does not exist: {:?}", output_dir);
        }
        if !output_dir.is_dir() {
            bail!("output_dir is not a directory: {:?}", output_dir);
        }

        let max_playlist_depth = file.max_playlist_depth.unwrap_or(cli.max_playlist_depth);
        if max_playlist_depth < 1 {
            bail!("max_playlist_depth must be at least 1");
        }

        let http_timeout_sec = file.http_timeout_sec.unwrap_or(cli.http_timeout_sec);
        let user_agent = file
            .user_agent
            .or_else(|| cli.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            db_file,
            output_dir,
            max_playlist_depth,
            http_timeout_sec,
            user_agent,
        })
    }
}

fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_with_db(temp_dir: &TempDir) -> CliConfig {
        CliConfig {
            db_file: Some(temp_dir.path().join("tapedeck.db")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only_applies_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_with_db(&temp_dir), None).unwrap();

        assert_eq!(config.db_file, temp_dir.path().join("tapedeck.db"));
        assert_eq!(config.output_dir, temp_dir.path());
        assert_eq!(config.max_playlist_depth, 8);
        assert_eq!(config.http_timeout_sec, 300);
        assert!(config.user_agent.starts_with("tapedeck/"));
    }

    #[test]
    fn test_toml_overrides_cli() {
        let cli_dir = TempDir::new().unwrap();
        let file_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            max_playlist_depth: 2,
            http_timeout_sec: 10,
            user_agent: Some("cli-agent".to_string()),
            ..cli_with_db(&cli_dir)
        };
        let file = FileConfig {
            db_file: Some(file_dir.path().join("other.db").to_string_lossy().into_owned()),
            output_dir: Some(out_dir.path().to_string_lossy().into_owned()),
            max_playlist_depth: Some(4),
            http_timeout_sec: None,
            user_agent: Some("file-agent".to_string()),
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_file, file_dir.path().join("other.db"));
        assert_eq!(config.output_dir, out_dir.path());
        assert_eq!(config.max_playlist_depth, 4);
        assert_eq!(config.http_timeout_sec, 10);
        assert_eq!(config.user_agent, "file-agent");
    }

    #[test]
    fn test_missing_db_file_is_rejected() {
        let err = AppConfig::resolve(&CliConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("db_file must be specified"));
    }

    #[test]
    fn test_missing_output_dir_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            output_dir: Some(temp_dir.path().join("nope")),
            ..cli_with_db(&temp_dir)
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("Output directory does not exist"));
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            max_playlist_depth: 0,
            ..cli_with_db(&temp_dir)
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        assert_eq!(parent_dir(Path::new("tapedeck.db")), PathBuf::from("."));
        assert_eq!(
            parent_dir(Path::new("/data/tapedeck.db")),
            PathBuf::from("/data")
        );
    }
}
