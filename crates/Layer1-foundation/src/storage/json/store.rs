//! JSON file store
//!
//! Small helper for the typed JSON records Tollgate keeps on disk
//! (ledger, market status, config). Writes go to a sibling temp file
//! that is renamed into place so readers never see a half-written file.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used for global and project configuration
pub const APP_DIR_NAME: &str = "tollgate";

/// JSON file store rooted at one directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Global store (~/.config/tollgate/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(APP_DIR_NAME);
        Ok(Self::new(dir))
    }

    /// Project store (.tollgate/)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(format!(".{}", APP_DIR_NAME)))
    }

    /// Project store for the current directory
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    /// Default data directory (~/.local/share/tollgate/)
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir)
                .map_err(|e| Error::storage(&self.base_dir, e))?;
        }
        Ok(())
    }

    /// Load a JSON record
    ///
    /// A missing file is `Error::NotFound`; unparsable content is `Error::Json`.
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(Error::storage(&path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a JSON record if the file exists
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        match self.load(filename) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_absent() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Save a JSON record (write to temp, then rename)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        let content = serde_json::to_string_pretty(data)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| Error::storage(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| Error::storage(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("nested"));

        let sample = Sample {
            name: "ledger".into(),
            count: 3,
        };
        store.save("sample.json", &sample).unwrap();

        let loaded: Sample = store.load("sample.json").unwrap();
        assert_eq!(loaded, sample);
        assert!(!store.file_path("sample.json.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        let err = store.load::<Sample>("missing.json").unwrap_err();
        assert!(err.is_absent());
        assert!(store.load_optional::<Sample>("missing.json").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_not_absent() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        std::fs::write(store.file_path("bad.json"), "{ not json").unwrap();

        let err = store.load::<Sample>("bad.json").unwrap_err();
        assert!(err.is_corrupt());
        assert!(!err.is_absent());
        assert!(store.load_optional::<Sample>("bad.json").is_err());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        store.save("x.json", &Sample::default()).unwrap();

        let updated = Sample {
            name: "again".into(),
            count: 7,
        };
        store.save("x.json", &updated).unwrap();
        assert_eq!(store.load::<Sample>("x.json").unwrap(), updated);
    }
}
