//! Orchestrator - 프로세스당 하나의 오케스트레이션 컨텍스트
//!
//! 레지스트리, 버스, 통신 매니저, 플러그인 매니저를 한 번에 구성하고
//! `Arc` 핸들로 나눠준다. 전역 상태는 없으므로 테스트에서는 여러 개를
//! 동시에 만들어도 서로 간섭하지 않는다.
//!
//! ## 사용 예시
//! ```ignore
//! let nexus = Orchestrator::builder()
//!     .config(NexusConfig::load()?)
//!     .store(Arc::new(FileStore::global()?))
//!     .build()?;
//!
//! nexus.registry().register_service(descriptor)?;
//! nexus.communication().broadcast_message("catalog", json!({"sale": true}))?;
//! nexus.plugins().restore().await?;
//!
//! nexus.shutdown().await;
//! ```

use crate::bus::{LoggingMiddleware, SecurityMiddleware, ServiceBus, ValidationMiddleware};
use crate::communication::ServiceCommunicationManager;
use crate::plugin::{
    DeclarativeModuleLoader, HttpManifestSource, ManifestSource, ModuleLoader, PluginManager,
};
use crate::registry::ServiceRegistry;
use nexus_foundation::{KeyValueStore, MemoryStore, NexusConfig, Result};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: NexusConfig,
    registry: Arc<ServiceRegistry>,
    bus: Arc<ServiceBus>,
    communication: Arc<ServiceCommunicationManager>,
    plugins: Arc<PluginManager>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// 설정과 외부 포트로 전체 구성
    pub fn new(
        config: NexusConfig,
        manifest_source: Arc<dyn ManifestSource>,
        module_loader: Arc<dyn ModuleLoader>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let registry = Arc::new(ServiceRegistry::new());

        let bus = Arc::new(ServiceBus::new(config.bus.clone()));
        bus.add_middleware(Arc::new(SecurityMiddleware::new(config.security.clone())));
        bus.add_middleware(Arc::new(ValidationMiddleware::new(config.validation.clone())));
        if config.bus.enable_logging {
            bus.add_middleware(Arc::new(LoggingMiddleware::new()));
        }

        let communication = ServiceCommunicationManager::new(
            config.communication.clone(),
            registry.clone(),
            bus.clone(),
        );

        let plugins = Arc::new(PluginManager::new(
            config.plugins.clone(),
            registry.clone(),
            manifest_source,
            module_loader,
            store,
        )?);

        info!(
            middleware = ?bus.middleware_names(),
            platform = %plugins.platform_version(),
            "Orchestrator ready"
        );

        Ok(Self {
            config,
            registry,
            bus,
            communication,
            plugins,
        })
    }

    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn bus(&self) -> Arc<ServiceBus> {
        self.bus.clone()
    }

    pub fn communication(&self) -> Arc<ServiceCommunicationManager> {
        self.communication.clone()
    }

    pub fn plugins(&self) -> Arc<PluginManager> {
        self.plugins.clone()
    }

    /// 업데이트 확인 중지 후 통신과 버스 정지
    pub async fn shutdown(&self) {
        self.plugins.stop_update_checker().await;
        self.communication.stop();
        self.bus.stop();
        info!("Orchestrator shut down");
    }
}

// ============================================================================
// Builder
// ============================================================================

/// 지정하지 않은 포트는 HTTP 매니페스트, 선언형 모듈, 메모리 저장소를 사용
pub struct OrchestratorBuilder {
    config: NexusConfig,
    manifest_source: Option<Arc<dyn ManifestSource>>,
    module_loader: Option<Arc<dyn ModuleLoader>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: NexusConfig::default(),
            manifest_source: None,
            module_loader: None,
            store: None,
        }
    }

    pub fn config(mut self, config: NexusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn manifest_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.manifest_source = Some(source);
        self
    }

    pub fn module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = Some(loader);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        Orchestrator::new(
            self.config,
            self.manifest_source
                .unwrap_or_else(|| Arc::new(HttpManifestSource::new())),
            self.module_loader
                .unwrap_or_else(|| Arc::new(DeclarativeModuleLoader::new())),
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
        )
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
