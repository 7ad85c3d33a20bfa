//! 섹션별 설정

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 호스트 플랫폼 버전 (플러그인 호환성 검사 기준)
pub const DEFAULT_PLATFORM_VERSION: &str = "1.0.0";

// ============================================================================
// BusConfig - 서비스 버스
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// 요청 기본 타임아웃 (ms)
    pub default_timeout_ms: u64,

    /// 동시 진행 가능한 요청 수
    pub max_concurrent_requests: usize,

    /// 버스 정지 중 보관할 이벤트 수
    pub event_buffer_size: usize,

    /// Logging 미들웨어 등록 여부
    pub enable_logging: bool,
}

impl BusConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_concurrent_requests: 100,
            event_buffer_size: 1000,
            enable_logging: true,
        }
    }
}

// ============================================================================
// SecurityConfig - Security 미들웨어
// ============================================================================

/// 빈 allow 목록은 "모두 허용"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub allowed_sources: Vec<String>,
    pub blocked_sources: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub blocked_methods: Vec<String>,

    /// payload 정리 (script 태그, 위험 키 제거)
    pub sanitize_payloads: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_sources: Vec::new(),
            blocked_sources: Vec::new(),
            allowed_methods: Vec::new(),
            blocked_methods: Vec::new(),
            sanitize_payloads: true,
        }
    }
}

// ============================================================================
// ValidationConfig - Validation 미들웨어
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// 알려진 이벤트 타입 / 메서드만 허용
    pub strict_mode: bool,
}

// ============================================================================
// CommunicationConfig - 채널 통신
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommunicationConfig {
    /// 채널당 보관할 메시지 수 (초과 시 오래된 것부터 제거)
    pub history_limit: usize,

    /// 생성 즉시 메시지 전송 가능 상태
    pub auto_start: bool,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            auto_start: true,
        }
    }
}

// ============================================================================
// PluginConfig - 플러그인 관리
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    pub platform_version: String,

    /// 업데이트 확인 주기 (초)
    pub update_check_interval_secs: u64,

    /// 주기 확인 시 업데이트까지 적용
    pub auto_update: bool,
}

impl PluginConfig {
    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs.max(1))
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            platform_version: DEFAULT_PLATFORM_VERSION.to_string(),
            update_check_interval_secs: 24 * 60 * 60,
            auto_update: false,
        }
    }
}
