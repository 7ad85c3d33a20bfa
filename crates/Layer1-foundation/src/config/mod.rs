//! Config - 통합 설정 관리
//!
//! - `sections.rs` - 버스 / 보안 / 검증 / 통신 / 플러그인 설정
//! - `nexus.rs` - NexusConfig 통합 설정 (글로벌 + 프로젝트 병합)

mod nexus;
mod sections;

pub use nexus::{merge_json, NexusConfig, NEXUS_CONFIG_FILE};
pub use sections::{
    BusConfig, CommunicationConfig, PluginConfig, SecurityConfig, ValidationConfig,
    DEFAULT_PLATFORM_VERSION,
};
