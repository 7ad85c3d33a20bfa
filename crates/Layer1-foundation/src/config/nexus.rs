//! Nexus Config - 통합 설정
//!
//! 글로벌(~/.config/nexus) → 프로젝트(./.nexus) 순서로 병합한다.
//! 나중 레이어가 앞 레이어의 같은 키를 덮어쓴다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use super::{BusConfig, CommunicationConfig, PluginConfig, SecurityConfig, ValidationConfig};

/// 설정 파일명
pub const NEXUS_CONFIG_FILE: &str = "config.json";

// ============================================================================
// NexusConfig (통합)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusConfig {
    pub bus: BusConfig,
    pub security: SecurityConfig,
    pub validation: ValidationConfig,
    pub communication: CommunicationConfig,
    pub plugins: PluginConfig,
}

impl NexusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Ok(global) = JsonStore::global() {
            layers.push(global);
        }
        layers.push(JsonStore::current_project()?);
        Self::load_layers(&layers)
    }

    /// 지정 디렉토리의 config.json 하나만 로드 (없으면 기본값)
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load_layers(&[JsonStore::new(dir.as_ref())])
    }

    /// 레이어 순서대로 병합
    pub fn load_layers(layers: &[JsonStore]) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        for store in layers {
            if let Some(layer) = store.load_optional::<Value>(NEXUS_CONFIG_FILE)? {
                info!(path = %store.file_path(NEXUS_CONFIG_FILE).display(), "Loaded config layer");
                merge_json(&mut merged, layer);
            } else {
                debug!(path = %store.base_dir().display(), "No config layer");
            }
        }

        serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// 지정 디렉토리에 저장
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        JsonStore::new(dir.as_ref()).save(NEXUS_CONFIG_FILE, self)
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        JsonStore::global()?.save(NEXUS_CONFIG_FILE, self)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        JsonStore::current_project()?.save(NEXUS_CONFIG_FILE, self)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.communication.history_limit = limit;
        self
    }

    pub fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.bus.default_timeout_ms = ms;
        self
    }

    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.plugins.platform_version = version.into();
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.validation.strict_mode = strict;
        self
    }
}

/// JSON 객체 깊은 병합 (overlay 우선)
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
