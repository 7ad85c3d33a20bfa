//! # nexus-foundation
//!
//! Foundation layer for Nexus:
//! - Error: 공통 에러 타입 (Validation / Dependency / Delivery / Timeout / Update)
//! - Config: 통합 설정 (NexusConfig, 글로벌 + 프로젝트 병합)
//! - Storage: JsonStore (범용), KeyValueStore 포트 (Memory / File)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  nexus-core                                             │
//! │  Registry → Middleware → Bus → Communication → Plugins  │
//! │                     │                                   │
//! │                     ▼                                   │
//! │  nexus-foundation                                       │
//! │  Error / Result   NexusConfig   KeyValueStore           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{DeliveryError, DependencyError, Error, ErrorKind, Result, ValidationReport};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    BusConfig, CommunicationConfig, NexusConfig, PluginConfig, SecurityConfig, ValidationConfig,
    DEFAULT_PLATFORM_VERSION,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{FileStore, JsonStore, KeyValueStore, MemoryStore};
