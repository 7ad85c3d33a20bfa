//! nexus-core: Service orchestration runtime
//!
//! Layer2 - 서비스 모듈 등록, 메시징, 플러그인 라이프사이클
//!
//! # 주요 모듈
//!
//! - `registry`: 서비스 디스크립터 검증, 의존성 그래프, 활성화 상태
//! - `bus`: 미들웨어 파이프라인을 거치는 이벤트 / 요청-응답 버스
//! - `communication`: 채널 기반 서비스 간 메시지, 프레즌스, 데이터 동기화
//! - `plugin`: 원격 플러그인 설치 / 업데이트 / 영속화
//! - `context`: 위 구성요소를 한 번에 묶는 `Orchestrator`
//!
//! # 사용 예시
//!
//! ```ignore
//! use nexus_core::{Orchestrator, ServiceDescriptor};
//!
//! let nexus = Orchestrator::builder().build()?;
//!
//! let registry = nexus.registry();
//! registry.register_service(ServiceDescriptor::new("catalog", "Catalog", "1.0.0"))?;
//! registry.register_service(
//!     ServiceDescriptor::new("pricing", "Pricing", "1.0.0").with_dependency("catalog"),
//! )?;
//! registry.activate_with_dependencies("pricing")?;
//!
//! nexus.communication().broadcast_message("catalog", json!({"event": "restock"}))?;
//! ```

pub mod bus;
pub mod communication;
pub mod context;
pub mod plugin;
pub mod registry;
mod subscription;

// Re-exports: Context
pub use context::{Orchestrator, OrchestratorBuilder};

// Re-exports: Registry
pub use registry::{
    RegistryEvent, RegistryListener, RegistryStats, ServiceCapabilities, ServiceDescriptor,
    ServiceRegistry, ServiceRegistryEntry, ServiceValidator,
};

// Re-exports: Bus
pub use bus::{
    handler_fn, EventHandler, LoggingMiddleware, MiddlewareHooks, MiddlewarePipeline,
    RequestHandler, SecurityMiddleware, ServiceBus, ServiceEvent, ServiceMiddleware,
    ServiceRequest, ServiceResponse, ValidationMiddleware,
};

// Re-exports: Communication
pub use communication::{
    Channel, ChannelType, CommunicationEvent, Message, MessagePriority, MessageType,
    ServiceCommunicationManager, ServiceStatus,
};

// Re-exports: Plugin
pub use plugin::{
    DeclarativeModuleLoader, HttpManifestSource, ManifestSource, ModuleLoader, Plugin,
    PluginManager, PluginManifest, PluginModule, PluginVersion, StaticModuleLoader,
    UpdateOutcome,
};

pub use subscription::SubscriptionId;

// Layer1 re-exports
pub use nexus_foundation::{Error, NexusConfig, Result};

/// Layer2 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
