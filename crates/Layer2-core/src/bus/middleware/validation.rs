//! Validation Middleware - 이벤트 / 요청 / 응답 형태 검사

use super::{Flow, MiddlewareHooks, ServiceMiddleware};
use crate::bus::message::{ServiceEvent, ServiceRequest, ServiceResponse};
use nexus_foundation::ValidationConfig;
use serde_json::Value;
use tracing::warn;

pub const VALIDATION_PRIORITY: i32 = 50;

/// strict 모드에서 허용되는 이벤트 타입 (`custom.*` 추가 허용)
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "service.registered",
    "service.updated",
    "service.unregistered",
    "service.activated",
    "service.deactivated",
    "service.error",
    "service.status",
    "data.changed",
    "user.action",
    "system.notification",
];

/// strict 모드에서 허용되는 메서드 (점이 포함된 이름 추가 허용)
pub const KNOWN_METHODS: &[&str] = &[
    "get",
    "set",
    "create",
    "update",
    "delete",
    "execute",
    "process",
    "validate",
    "transform",
];

fn is_known_event_type(event_type: &str) -> bool {
    KNOWN_EVENT_TYPES.contains(&event_type) || event_type.starts_with("custom.")
}

fn is_known_method(method: &str) -> bool {
    KNOWN_METHODS.contains(&method) || method.contains('.')
}

fn is_object_or_null(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Null)
}

// ============================================================================
// ValidationMiddleware
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ValidationMiddleware {
    config: ValidationConfig,
}

impl ValidationMiddleware {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn strict() -> Self {
        Self::new(ValidationConfig { strict_mode: true })
    }

    pub fn is_strict(&self) -> bool {
        self.config.strict_mode
    }

    fn validate_event(&self, event: &ServiceEvent) -> Result<(), String> {
        for (field, value) in [
            ("id", &event.id),
            ("type", &event.event_type),
            ("source", &event.source),
        ] {
            if value.trim().is_empty() {
                return Err(format!("event {} is required", field));
            }
        }

        if !is_object_or_null(&event.payload) {
            return Err("event payload must be an object".to_string());
        }

        if self.config.strict_mode && !is_known_event_type(&event.event_type) {
            return Err(format!("unknown event type '{}'", event.event_type));
        }
        Ok(())
    }

    fn validate_request(&self, request: &ServiceRequest) -> Result<(), String> {
        for (field, value) in [
            ("id", &request.id),
            ("method", &request.method),
            ("source", &request.source),
            ("target", &request.target),
        ] {
            if value.trim().is_empty() {
                return Err(format!("request {} is required", field));
            }
        }

        if !is_object_or_null(&request.params) {
            return Err("request params must be an object".to_string());
        }

        if self.config.strict_mode && !is_known_method(&request.method) {
            return Err(format!("unknown method '{}'", request.method));
        }
        Ok(())
    }
}

impl ServiceMiddleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    fn priority(&self) -> i32 {
        VALIDATION_PRIORITY
    }

    fn hooks(&self) -> MiddlewareHooks {
        MiddlewareHooks::none()
            .with_before_event()
            .with_before_request()
            .with_after_response()
            .dropping()
    }

    fn before_event(&self, event: ServiceEvent) -> Flow<ServiceEvent> {
        match self.validate_event(&event) {
            Ok(()) => Flow::Continue(event),
            Err(reason) => Flow::Drop(reason),
        }
    }

    fn before_request(&self, request: ServiceRequest) -> Flow<ServiceRequest> {
        match self.validate_request(&request) {
            Ok(()) => Flow::Continue(request),
            Err(reason) => Flow::Drop(reason),
        }
    }

    fn after_response(
        &self,
        request: &ServiceRequest,
        response: ServiceResponse,
    ) -> Flow<ServiceResponse> {
        if !response.success && response.error.is_none() {
            warn!(request_id = %request.id, "Failed response without error message");
        }
        Flow::Continue(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_event_fields() {
        let validation = ValidationMiddleware::default();
        let mut event = ServiceEvent::new("data.changed", "catalog", json!({}));
        assert!(!validation.before_event(event.clone()).is_drop());

        event.source = " ".into();
        assert_eq!(
            validation.before_event(event),
            Flow::Drop("event source is required".into())
        );
    }

    #[test]
    fn test_payload_shape() {
        let validation = ValidationMiddleware::default();
        assert!(validation
            .before_event(ServiceEvent::new("data.changed", "a", json!([1, 2])))
            .is_drop());
        assert!(!validation
            .before_event(ServiceEvent::new("data.changed", "a", Value::Null))
            .is_drop());
    }

    #[test]
    fn test_strict_event_types() {
        let lenient = ValidationMiddleware::default();
        let strict = ValidationMiddleware::strict();
        let odd = ServiceEvent::new("odd.thing", "a", json!({}));

        assert!(!lenient.before_event(odd.clone()).is_drop());
        assert!(strict.before_event(odd).is_drop());
        assert!(!strict
            .before_event(ServiceEvent::new("custom.order.created", "a", json!({})))
            .is_drop());
    }

    #[test]
    fn test_strict_methods() {
        let strict = ValidationMiddleware::strict();
        assert!(!strict
            .before_request(ServiceRequest::new("a", "b", "get", json!({})))
            .is_drop());
        assert!(!strict
            .before_request(ServiceRequest::new("a", "b", "catalog.lookup", json!({})))
            .is_drop());
        assert!(strict
            .before_request(ServiceRequest::new("a", "b", "frobnicate", json!({})))
            .is_drop());
    }

    #[test]
    fn test_request_requires_target() {
        let validation = ValidationMiddleware::default();
        assert!(validation
            .before_request(ServiceRequest::new("a", "", "get", json!({})))
            .is_drop());
    }
}
