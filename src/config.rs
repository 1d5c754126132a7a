use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "photobook.toml";

/// Service configuration, read from a TOML file. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Root of the tree every authenticated user can see.
    pub public_dir: PathBuf,
    /// Root holding one directory per grantable private folder.
    pub private_dir: PathBuf,
    /// Logical first path segment that addresses the private tree.
    pub private_marker: String,
    /// Directories that symlinks inside the storage roots may point into.
    pub linked_roots: Vec<PathBuf>,
    pub database: PathBuf,
    /// Size of the blocking pool that walks, decodes and zips.
    pub workers: usize,
    pub ffmpeg: PathBuf,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub realm: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            public_dir: PathBuf::from("PUBLIC"),
            private_dir: PathBuf::from("PRIVATE"),
            private_marker: "PRIVATE".to_string(),
            linked_roots: Vec::new(),
            database: PathBuf::from("photobook.db"),
            workers: 16,
            ffmpeg: PathBuf::from("ffmpeg"),
            log_level: "info".to_string(),
            log_dir: None,
            realm: "Media explorer".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults; relative
    /// directories are anchored at the file's parent directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str::<Config>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(ConfigError::Read(path.to_path_buf(), e)),
        };
        config.anchored_at(&base).validated()
    }

    fn anchored_at(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.public_dir);
        anchor(&mut self.private_dir);
        anchor(&mut self.database);
        self.linked_roots.iter_mut().for_each(anchor);
        if let Some(dir) = self.log_dir.as_mut() {
            anchor(dir);
        }
        self
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let marker = self.private_marker.as_str();
        if marker.is_empty() || marker.contains(['/', '\\']) || marker == "." || marker == ".." {
            return Err(ConfigError::Invalid(format!(
                "private_marker must be a single path segment, got {:?}",
                marker
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        self.tracing_level()?;
        Ok(self)
    }

    pub fn tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log_level)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.listen_addr.port(), 5000);
        assert_eq!(config.private_marker, "PRIVATE");
        assert_eq!(config.public_dir, dir.path().join("PUBLIC"));
        assert_eq!(config.workers, 16);
    }

    #[test]
    fn reads_and_anchors_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photobook.toml");
        std::fs::write(
            &path,
            r#"
listen_addr = "127.0.0.1:8080"
public_dir = "media/public"
private_dir = "/srv/private"
linked_roots = ["external"]
workers = 4
log_level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.public_dir, dir.path().join("media/public"));
        assert_eq!(config.private_dir, PathBuf::from("/srv/private"));
        assert_eq!(config.linked_roots, vec![dir.path().join("external")]);
        assert_eq!(config.tracing_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn rejects_bad_marker_and_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photobook.toml");

        std::fs::write(&path, "private_marker = \"a/b\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "thumbnail_size = 100\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
