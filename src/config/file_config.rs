use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_file: Option<String>,
    pub output_dir: Option<String>,
    pub max_playlist_depth: Option<usize>,
    pub http_timeout_sec: Option<u64>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tapedeck.toml");
        std::fs::write(&path, "db_file = \"/data/tapedeck.db\"\nmax_playlist_depth = 3\n").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.db_file.as_deref(), Some("/data/tapedeck.db"));
        assert_eq!(config.max_playlist_depth, Some(3));
        assert_eq!(config.output_dir, None);
        assert_eq!(config.http_timeout_sec, None);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tapedeck.toml");
        std::fs::write(&path, "max_playlist_depth = \"deep\"\n").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FileConfig::load(Path::new("/no/such/tapedeck.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
