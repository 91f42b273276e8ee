//! Where docseek keeps its state: the settings and folder registry database
//! plus the embedded engine's indexes.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DOCSEEK_DATA_DIR";

const CONFIG_DB_FILE: &str = "config.redb";
const INDEXES_DIR: &str = "indexes";

/// The resolved, existing, absolute data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCSEEK_DATA_DIR environment variable, when not blank
    /// 3. The XDG data directory (~/.local/share/docseek/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    /// [`DataDir::resolve`] with an explicit environment lookup.
    pub fn resolve_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let from_env = env(DATA_DIR_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let root = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => path,
            None => xdg::BaseDirectories::with_prefix("docseek")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?,
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        // Relative paths are anchored at the current working directory.
        let root = std::path::absolute(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder registry, folder stats and settings.
    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_DB_FILE)
    }

    /// Root of the embedded engine's on-disk indexes, created on demand.
    pub fn local_index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join(INDEXES_DIR);
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }

    /// Bytes the embedded engine's indexes occupy on disk.
    pub fn local_index_bytes(&self) -> Result<u64> {
        let path = self.root.join(INDEXES_DIR);
        if !path.is_dir() {
            return Ok(0);
        }
        dir_bytes(&path)
    }
}

fn dir_bytes(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_bytes(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let tmp = tempfile::tempdir().unwrap();
        let other = tmp.path().join("from_env");
        let dir = DataDir::resolve_with(Some(tmp.path()), |name| {
            (name == DATA_DIR_ENV).then(|| other.display().to_string())
        })
        .unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
        assert!(!other.exists());
    }

    #[test]
    fn env_path_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve_with(None, |name| {
            (name == DATA_DIR_ENV).then(|| nested.display().to_string())
        })
        .unwrap();

        assert_eq!(dir.root(), nested);
        assert!(dir.root().is_dir());
    }

    #[test]
    fn env_value_is_trimmed() {
        let tmp = tempfile::tempdir().unwrap();
        let padded = format!("  {}\n", tmp.path().display());
        let dir = DataDir::resolve_with(None, |_| Some(padded.clone())).unwrap();
        assert_eq!(dir.root(), tmp.path());
    }

    #[test]
    fn root_is_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(Some(tmp.path()), no_env).unwrap();
        assert!(dir.root().is_absolute());
    }

    #[test]
    fn index_footprint_counts_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(Some(tmp.path()), no_env).unwrap();
        assert_eq!(dir.local_index_bytes().unwrap(), 0);

        let indexes = dir.local_index_dir().unwrap();
        assert_eq!(indexes, tmp.path().join("indexes"));
        std::fs::create_dir(indexes.join("folder_a")).unwrap();
        std::fs::write(indexes.join("folder_a").join("seg"), [0u8; 100])
            .unwrap();
        std::fs::write(indexes.join("meta.json"), "{}").unwrap();

        assert_eq!(dir.local_index_bytes().unwrap(), 102);
    }
}
