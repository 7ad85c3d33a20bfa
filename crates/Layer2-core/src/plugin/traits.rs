//! Plugin traits - 플러그인 모듈과 외부 포트

use super::manifest::PluginManifest;
use async_trait::async_trait;
use nexus_foundation::Result;
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// PluginModule - 로드된 플러그인 코드
// ============================================================================

/// 로드된 플러그인 모듈
///
/// 호스트는 이 인터페이스만 알고 실제 코드가 어디서 왔는지는 모른다.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// 모듈이 실제로 제공하는 기능
    fn capabilities(&self) -> Vec<String>;

    /// 활성화 시 호출
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// 비활성화, 제거, 교체 시 호출
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, method: &str, params: Value) -> Result<Value>;
}

// ============================================================================
// Ports
// ============================================================================

/// 매니페스트 조회 포트
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(&self, url: &str) -> Result<PluginManifest>;
}

/// 모듈 로드 포트 (검증이 끝난 뒤에만 호출된다)
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, url: &str, manifest: &PluginManifest) -> Result<Arc<dyn PluginModule>>;
}
