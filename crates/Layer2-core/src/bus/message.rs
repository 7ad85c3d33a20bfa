//! Bus Message - 이벤트 / 요청 / 응답

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// ServiceEvent - 발행/구독 이벤트
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    pub id: String,

    /// 이벤트 타입 (예: "service.registered", "custom.order.created")
    #[serde(rename = "type")]
    pub event_type: String,

    /// 발행 서비스 ID
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub payload: Value,

    pub timestamp: DateTime<Utc>,

    /// 유효 시간 (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl ServiceEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            target: None,
            payload,
            timestamp: Utc::now(),
            ttl_ms: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// TTL이 지났는지
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.timestamp, self.ttl_ms, now)
    }
}

// ============================================================================
// ServiceRequest / ServiceResponse - 요청/응답
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: String,

    /// 메서드 (예: "get", "catalog.lookup")
    pub method: String,

    pub source: String,

    /// 응답 서비스 ID
    pub target: String,

    #[serde(default)]
    pub params: Value,

    /// 호출자 지정 타임아웃 (ms, 없으면 버스 기본값)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    pub timestamp: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            source: source.into(),
            target: target.into(),
            params,
            timeout_ms: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub id: String,
    pub request_id: String,
    pub success: bool,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl ServiceResponse {
    pub fn ok(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            success: true,
            data,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// timestamp + ttl < now
pub(crate) fn is_expired(timestamp: DateTime<Utc>, ttl_ms: Option<u64>, now: DateTime<Utc>) -> bool {
    match ttl_ms {
        Some(ttl) => {
            let ttl = ChronoDuration::milliseconds(ttl.min(i64::MAX as u64 / 2) as i64);
            timestamp
                .checked_add_signed(ttl)
                .map(|deadline| deadline < now)
                .unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_expiry() {
        let now = Utc::now();
        let event = ServiceEvent::new("data.changed", "catalog", json!({}))
            .with_ttl(Duration::from_millis(100))
            .with_timestamp(now - ChronoDuration::seconds(1));
        assert!(event.is_expired_at(now));

        let fresh = ServiceEvent::new("data.changed", "catalog", json!({}))
            .with_ttl(Duration::from_secs(60));
        assert!(!fresh.is_expired_at(Utc::now()));

        let forever = ServiceEvent::new("data.changed", "catalog", json!({}));
        assert!(!forever.is_expired_at(now + ChronoDuration::days(365)));
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = ServiceEvent::new("user.action", "ui", json!({ "click": 1 }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user.action");
        assert!(value.get("ttlMs").is_none());
    }

    #[test]
    fn test_response_constructors() {
        let ok = ServiceResponse::ok("req-1", json!(42));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ServiceResponse::failure("req-1", "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
