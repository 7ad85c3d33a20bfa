//! Middleware - 버스 연산을 감싸는 파이프라인 단계
//!
//! 각 미들웨어는 `hooks()`로 자신이 구현한 슬롯을 선언한다.
//! 선언하지 않은 슬롯은 호출되지 않는다.
//!
//! ```text
//! publish ─▶ Security(10) ─▶ Validation(50) ─▶ Logging(100) ─▶ subscribers
//!                 │ Drop            │ Drop
//!                 ▼                 ▼
//!            DeliveryError::Dropped (이후 단계 미실행)
//! ```

mod logging;
mod security;
mod validation;

pub use logging::{LoggingMiddleware, LoggingStats, LOGGING_PRIORITY};
pub use security::{sanitize_value, SecurityMiddleware, SECURITY_PRIORITY};
pub use validation::{
    ValidationMiddleware, KNOWN_EVENT_TYPES, KNOWN_METHODS, VALIDATION_PRIORITY,
};

use super::message::{ServiceEvent, ServiceRequest, ServiceResponse};
use nexus_foundation::{DeliveryError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Flow - 계속 / 중단 신호
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T> {
    /// 다음 단계로 (수정된 값 전달 가능)
    Continue(T),

    /// 체인 중단
    Drop(String),
}

impl<T> Flow<T> {
    pub fn drop(reason: impl Into<String>) -> Self {
        Flow::Drop(reason.into())
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Flow::Drop(_))
    }
}

// ============================================================================
// MiddlewareHooks - 구현 슬롯 선언
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiddlewareHooks {
    pub before_event: bool,
    pub after_event: bool,
    pub before_request: bool,
    pub after_response: bool,

    /// false면 Drop을 반환해도 무시된다 (관측 전용)
    pub may_drop: bool,
}

impl MiddlewareHooks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            before_event: true,
            after_event: true,
            before_request: true,
            after_response: true,
            may_drop: true,
        }
    }

    pub fn with_before_event(mut self) -> Self {
        self.before_event = true;
        self
    }

    pub fn with_after_event(mut self) -> Self {
        self.after_event = true;
        self
    }

    pub fn with_before_request(mut self) -> Self {
        self.before_request = true;
        self
    }

    pub fn with_after_response(mut self) -> Self {
        self.after_response = true;
        self
    }

    pub fn dropping(mut self) -> Self {
        self.may_drop = true;
        self
    }

    pub fn observe_only(mut self) -> Self {
        self.may_drop = false;
        self
    }
}

// ============================================================================
// ServiceMiddleware - 미들웨어 trait
// ============================================================================

/// 버스 미들웨어
///
/// 기본 구현은 값을 그대로 통과시킨다.
pub trait ServiceMiddleware: Send + Sync {
    fn name(&self) -> &str;

    /// 낮을수록 먼저 실행
    fn priority(&self) -> i32;

    fn hooks(&self) -> MiddlewareHooks;

    fn before_event(&self, event: ServiceEvent) -> Flow<ServiceEvent> {
        Flow::Continue(event)
    }

    /// 전달 후 호출 (`delivered` = 전달된 구독자 수)
    fn after_event(&self, event: ServiceEvent, _delivered: usize) -> Flow<ServiceEvent> {
        Flow::Continue(event)
    }

    fn before_request(&self, request: ServiceRequest) -> Flow<ServiceRequest> {
        Flow::Continue(request)
    }

    fn after_response(
        &self,
        _request: &ServiceRequest,
        response: ServiceResponse,
    ) -> Flow<ServiceResponse> {
        Flow::Continue(response)
    }
}

// ============================================================================
// MiddlewarePipeline
// ============================================================================

/// 우선순위 오름차순 미들웨어 체인 (같은 우선순위는 추가 순서)
#[derive(Default)]
pub struct MiddlewarePipeline {
    stages: RwLock<Vec<Arc<dyn ServiceMiddleware>>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 미들웨어 추가
    pub fn add(&self, middleware: Arc<dyn ServiceMiddleware>) {
        let mut stages = self.stages.write();
        debug!(
            middleware = middleware.name(),
            priority = middleware.priority(),
            "Middleware added"
        );
        stages.push(middleware);
        stages.sort_by_key(|m| m.priority());
    }

    /// 이름으로 제거
    pub fn remove(&self, name: &str) -> bool {
        let mut stages = self.stages.write();
        let before = stages.len();
        stages.retain(|m| m.name() != name);
        stages.len() != before
    }

    /// 실행 순서대로 이름
    pub fn names(&self) -> Vec<String> {
        self.stages.read().iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ServiceMiddleware>> {
        self.stages.read().clone()
    }

    pub fn run_before_event(&self, event: ServiceEvent) -> Result<ServiceEvent> {
        run_chain(
            &self.snapshot(),
            event,
            |h| h.before_event,
            |m, e| m.before_event(e),
        )
    }

    pub fn run_after_event(&self, event: ServiceEvent, delivered: usize) -> Result<ServiceEvent> {
        run_chain(
            &self.snapshot(),
            event,
            |h| h.after_event,
            |m, e| m.after_event(e, delivered),
        )
    }

    pub fn run_before_request(&self, request: ServiceRequest) -> Result<ServiceRequest> {
        run_chain(
            &self.snapshot(),
            request,
            |h| h.before_request,
            |m, r| m.before_request(r),
        )
    }

    pub fn run_after_response(
        &self,
        request: &ServiceRequest,
        response: ServiceResponse,
    ) -> Result<ServiceResponse> {
        run_chain(
            &self.snapshot(),
            response,
            |h| h.after_response,
            |m, r| m.after_response(request, r),
        )
    }
}

fn run_chain<T, S, C>(
    stages: &[Arc<dyn ServiceMiddleware>],
    mut value: T,
    selected: S,
    call: C,
) -> Result<T>
where
    T: Clone,
    S: Fn(&MiddlewareHooks) -> bool,
    C: Fn(&dyn ServiceMiddleware, T) -> Flow<T>,
{
    for stage in stages {
        let hooks = stage.hooks();
        if !selected(&hooks) {
            continue;
        }

        // 관측 전용 단계는 Drop을 무시해야 하므로 원본 보관
        let backup = (!hooks.may_drop).then(|| value.clone());

        match call(stage.as_ref(), value) {
            Flow::Continue(next) => value = next,
            Flow::Drop(reason) => match backup {
                Some(original) => {
                    warn!(
                        middleware = stage.name(),
                        reason = %reason,
                        "Observe-only middleware attempted to drop; ignored"
                    );
                    value = original;
                }
                None => {
                    debug!(middleware = stage.name(), reason = %reason, "Dropped by middleware");
                    return Err(DeliveryError::Dropped {
                        middleware: stage.name().to_string(),
                        reason,
                    }
                    .into());
                }
            },
        }
    }
    Ok(value)
}
