//! Key-Value 저장소
//!
//! 문자열 키로 문자열 값을 보관하는 영속 저장소 포트.
//! 플러그인 인덱스처럼 고정 키 아래 JSON 문서를 저장할 때 사용한다.

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::JsonStore;

// ============================================================================
// KeyValueStore - 저장소 포트
// ============================================================================

/// 영속 Key-Value 저장소
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 값 조회 (없으면 None)
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 값 저장 (덮어쓰기)
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 값 삭제, 존재했으면 true
    async fn remove(&self, key: &str) -> Result<bool>;
}

// ============================================================================
// MemoryStore - 인메모리 구현
// ============================================================================

/// 프로세스 메모리에만 존재하는 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

// ============================================================================
// FileStore - 디렉토리 기반 구현
// ============================================================================

/// 키 하나당 파일 하나 (`{key}.json`)
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: JsonStore,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: JsonStore::new(base_dir),
        }
    }

    /// 글로벌 데이터 디렉토리 (~/.config/nexus/data)
    pub fn global() -> Result<Self> {
        let store = JsonStore::global()?;
        Ok(Self::new(store.base_dir().join("data")))
    }

    pub fn base_dir(&self) -> &Path {
        self.inner.base_dir()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.inner.file_path(&format!("{}.json", safe))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.ensure_dir()?;
        let path = self.path_for(key);
        // 임시 파일에 쓴 뒤 rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit {}: {}", path.display(), e)))?;
        debug!(key = key, path = %path.display(), "kv value stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("nexus.plugins", "[]").await.unwrap();
        assert_eq!(store.get("nexus.plugins").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(store.len(), 1);

        assert!(store.remove("nexus.plugins").await.unwrap());
        assert!(!store.remove("nexus.plugins").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("data"));

        assert!(store.get("nexus.plugins").await.unwrap().is_none());
        store.set("nexus.plugins", r#"[{"id":"a"}]"#).await.unwrap();
        assert_eq!(
            store.get("nexus.plugins").await.unwrap().as_deref(),
            Some(r#"[{"id":"a"}]"#)
        );
        assert!(temp.path().join("data/nexus.plugins.json").exists());

        assert!(store.remove("nexus.plugins").await.unwrap());
        assert!(store.get("nexus.plugins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_keys() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.set("../escape/me", "1").await.unwrap();
        assert!(temp.path().join(".._escape_me.json").exists());
        assert_eq!(store.get("../escape/me").await.unwrap().as_deref(), Some("1"));
    }
}
