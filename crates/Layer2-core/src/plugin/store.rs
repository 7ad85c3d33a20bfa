//! Plugin Index - 설치된 플러그인 목록 영속화
//!
//! Key-Value 저장소의 고정 키 아래 JSON 배열로 저장한다.
//!
//! ```json
//! [{ "id": "...", "manifest": { ... }, "isEnabled": true, "lastUpdate": "...", "sourceUrl": "..." }]
//! ```

use super::manifest::PluginManifest;
use chrono::{DateTime, Utc};
use nexus_foundation::{Error, KeyValueStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// 플러그인 인덱스 저장 키
pub const PLUGIN_INDEX_KEY: &str = "nexus.plugins";

// ============================================================================
// PluginRecord - 인덱스 항목
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub id: String,
    pub manifest: PluginManifest,
    pub is_enabled: bool,
    pub last_update: DateTime<Utc>,

    /// 설치에 사용한 URL (재시작 시 모듈 재로드)
    #[serde(default)]
    pub source_url: String,
}

// ============================================================================
// PluginIndex
// ============================================================================

#[derive(Clone)]
pub struct PluginIndex {
    store: Arc<dyn KeyValueStore>,
}

impl PluginIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 저장된 목록 로드 (없으면 빈 목록)
    pub async fn load(&self) -> Result<Vec<PluginRecord>> {
        let Some(raw) = self.store.get(PLUGIN_INDEX_KEY).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).map_err(|e| {
            warn!("Corrupted plugin index: {}", e);
            Error::Storage(format!("invalid plugin index: {}", e))
        })
    }

    /// 전체 목록 저장 (순서 유지)
    pub async fn save(&self, records: &[PluginRecord]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.store.set(PLUGIN_INDEX_KEY, &raw).await?;
        debug!("Saved plugin index ({} plugins)", records.len());
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(PLUGIN_INDEX_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::PluginVersion;
    use nexus_foundation::MemoryStore;

    fn record(id: &str) -> PluginRecord {
        PluginRecord {
            id: id.to_string(),
            manifest: PluginManifest::new(id, id, PluginVersion::new(1, 0, 0)),
            is_enabled: true,
            last_update: Utc::now(),
            source_url: format!("mem://{}", id),
        }
    }

    #[tokio::test]
    async fn test_empty_index() {
        let index = PluginIndex::new(Arc::new(MemoryStore::new()));
        assert!(index.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = Arc::new(MemoryStore::new());
        let index = PluginIndex::new(store.clone());
        index.save(&[record("a"), record("b")]).await.unwrap();

        let loaded = index.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");

        let raw = store.get(PLUGIN_INDEX_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.is_array());
        for field in ["id", "manifest", "isEnabled", "lastUpdate"] {
            assert!(value[0].get(field).is_some(), "missing {}", field);
        }

        index.clear().await.unwrap();
        assert!(index.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_save_keeps_order() {
        let index = PluginIndex::new(Arc::new(MemoryStore::new()));
        let ids: Vec<String> = tokio_test::block_on(async {
            index
                .save(&[record("zeta"), record("alpha"), record("mid")])
                .await
                .unwrap();
            index.load().await.unwrap()
        })
        .into_iter()
        .map(|r| r.id)
        .collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_corrupted_index() {
        let store = Arc::new(MemoryStore::new());
        store.set(PLUGIN_INDEX_KEY, "{not json").await.unwrap();
        let index = PluginIndex::new(store);
        assert!(matches!(index.load().await, Err(Error::Storage(_))));
    }
}
