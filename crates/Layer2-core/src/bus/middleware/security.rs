//! Security Middleware - 출처/메서드 차단, TTL 만료, payload 정리

use super::{Flow, MiddlewareHooks, ServiceMiddleware};
use crate::bus::message::{ServiceEvent, ServiceRequest};
use chrono::Utc;
use nexus_foundation::SecurityConfig;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

pub const SECURITY_PRIORITY: i32 = 10;

static SCRIPT_TAG: OnceLock<Option<Regex>> = OnceLock::new();

fn script_tag() -> Option<&'static Regex> {
    SCRIPT_TAG
        .get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").ok())
        .as_ref()
}

/// 위험한 키인지 (`__proto__`, `constructor`, `prototype` 계열)
fn is_dangerous_key(key: &str) -> bool {
    key.starts_with("__") || key.contains("prototype") || key.contains("constructor")
}

/// 문자열의 script 블록 제거, 위험 키 제거 (재귀)
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => match script_tag() {
            Some(re) => Value::String(re.replace_all(&s, "").into_owned()),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !is_dangerous_key(k))
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

// ============================================================================
// SecurityMiddleware
// ============================================================================

pub struct SecurityMiddleware {
    config: SecurityConfig,
}

impl SecurityMiddleware {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    fn check_source(&self, source: &str) -> Result<(), String> {
        if self.config.blocked_sources.iter().any(|s| s == source) {
            return Err(format!("source '{}' is blocked", source));
        }
        if !self.config.allowed_sources.is_empty()
            && !self.config.allowed_sources.iter().any(|s| s == source)
        {
            return Err(format!("source '{}' is not allowed", source));
        }
        Ok(())
    }

    fn check_method(&self, method: &str) -> Result<(), String> {
        if self.config.blocked_methods.iter().any(|m| m == method) {
            return Err(format!("method '{}' is blocked", method));
        }
        if !self.config.allowed_methods.is_empty()
            && !self.config.allowed_methods.iter().any(|m| m == method)
        {
            return Err(format!("method '{}' is not allowed", method));
        }
        Ok(())
    }
}

impl Default for SecurityMiddleware {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl ServiceMiddleware for SecurityMiddleware {
    fn name(&self) -> &str {
        "security"
    }

    fn priority(&self) -> i32 {
        SECURITY_PRIORITY
    }

    fn hooks(&self) -> MiddlewareHooks {
        MiddlewareHooks::none()
            .with_before_event()
            .with_before_request()
            .dropping()
    }

    fn before_event(&self, mut event: ServiceEvent) -> Flow<ServiceEvent> {
        if let Err(reason) = self.check_source(&event.source) {
            warn!(event_id = %event.id, reason = %reason, "Event blocked");
            return Flow::Drop(reason);
        }

        if event.is_expired_at(Utc::now()) {
            return Flow::drop(format!("event {} expired", event.id));
        }

        if self.config.sanitize_payloads {
            event.payload = sanitize_value(event.payload);
        }
        Flow::Continue(event)
    }

    fn before_request(&self, mut request: ServiceRequest) -> Flow<ServiceRequest> {
        if let Err(reason) = self
            .check_source(&request.source)
            .and_then(|_| self.check_method(&request.method))
        {
            warn!(request_id = %request.id, reason = %reason, "Request blocked");
            return Flow::Drop(reason);
        }

        if self.config.sanitize_payloads {
            request.params = sanitize_value(request.params);
        }
        Flow::Continue(request)
    }
}
