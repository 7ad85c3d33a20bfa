//! JSON 파일 저장소

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// 글로벌 설정 디렉토리 이름 (~/.config/nexus)
pub const GLOBAL_DIR_NAME: &str = "nexus";

/// 프로젝트 설정 디렉토리 이름 (./.nexus)
pub const PROJECT_DIR_NAME: &str = ".nexus";

/// JSON 파일 저장소
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

    /// 글로벌 저장소 (~/.config/nexus/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(GLOBAL_DIR_NAME);
        Ok(Self::new(dir))
    }

    /// 프로젝트 저장소 (.nexus/)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(PROJECT_DIR_NAME))
    }

    /// 현재 디렉토리 프로젝트 저장소
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    pub(crate) fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }
        Ok(())
    }

    /// JSON 로드 (파일이 없으면 `None`)
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Storage(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// JSON 저장 (임시 파일에 쓴 뒤 교체)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        let content = serde_json::to_string_pretty(data)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", path.display(), e)))
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
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("nested"));

        let sample = Sample {
            name: "catalog".into(),
            count: 3,
        };
        store.save("sample.json", &sample).unwrap();

        let loaded: Option<Sample> = store.load_optional("sample.json").unwrap();
        assert_eq!(loaded, Some(sample));
        assert!(!temp.path().join("nested/sample.json.tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::project(temp.path());

        let missing: Option<Sample> = store.load_optional("missing.json").unwrap();
        assert!(missing.is_none());
        assert!(store.base_dir().ends_with(PROJECT_DIR_NAME));
    }

    #[test]
    fn test_corrupted_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.json"), "{ nope").unwrap();

        let store = JsonStore::new(temp.path());
        assert!(matches!(
            store.load_optional::<Sample>("broken.json"),
            Err(Error::Storage(_))
        ));
    }
}
