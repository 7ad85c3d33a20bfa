//! Registry Event - 레지스트리 변경 이벤트

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 레지스트리 변경 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// 서비스 등록됨 (비활성 상태)
    Registered { service_id: String, version: String },

    /// 디스크립터 교체됨 (플러그인 업데이트)
    Updated { service_id: String, version: String },

    /// 서비스 등록 해제됨
    Unregistered { service_id: String },

    /// 서비스 활성화됨
    Activated { service_id: String },

    /// 서비스 비활성화됨
    Deactivated { service_id: String },
}

impl RegistryEvent {
    pub fn service_id(&self) -> &str {
        match self {
            Self::Registered { service_id, .. }
            | Self::Updated { service_id, .. }
            | Self::Unregistered { service_id }
            | Self::Activated { service_id }
            | Self::Deactivated { service_id } => service_id,
        }
    }

    /// 버스로 전달할 때 사용하는 이벤트 타입
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "service.registered",
            Self::Updated { .. } => "service.updated",
            Self::Unregistered { .. } => "service.unregistered",
            Self::Activated { .. } => "service.activated",
            Self::Deactivated { .. } => "service.deactivated",
        }
    }
}

/// 동기 리스너
pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;
