//! # Service Registry
//!
//! 서비스 디스크립터 등록, 의존성 그래프 검증, 활성 상태 추적
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ServiceRegistry                             │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │  RwLock<HashMap<String, ServiceRegistryEntry>>          ││
//! │  │  ┌──────────┬──────────┬──────────┐                     ││
//! │  │  │ catalog  │ pricing  │ search   │  (inactive/active)  ││
//! │  │  └──────────┴──────────┴──────────┘                     ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │        │ ServiceValidator (형태 검사)                        │
//! │        │ find_cycle / visit (의존성 그래프)                  │
//! │        ▼                                                     │
//! │  RegistryEvent → 동기 리스너 + broadcast 스트림              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod entry;
mod events;
mod service;
mod validator;

pub use entry::{DependencyLink, ServiceCapabilities, ServiceDescriptor, ServiceRegistryEntry};
pub use events::{RegistryEvent, RegistryListener};
pub use service::{RegistryStats, ServiceRegistry};
pub use validator::{
    is_valid_service_id, is_valid_version, ServiceValidator, MAX_PRIORITY, VALID_CATEGORIES,
};
