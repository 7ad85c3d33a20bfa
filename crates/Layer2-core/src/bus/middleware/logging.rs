//! Logging Middleware - 관측 전용 (절대 drop하지 않음)

use super::{Flow, MiddlewareHooks, ServiceMiddleware};
use crate::bus::message::{ServiceEvent, ServiceRequest, ServiceResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

pub const LOGGING_PRIORITY: i32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingStats {
    pub events: u64,
    pub delivered: u64,
    pub requests: u64,
    pub responses: u64,
    pub failed_responses: u64,
}

#[derive(Debug, Default)]
pub struct LoggingMiddleware {
    events: AtomicU64,
    delivered: AtomicU64,
    requests: AtomicU64,
    responses: AtomicU64,
    failed_responses: AtomicU64,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            events: self.events.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            failed_responses: self.failed_responses.load(Ordering::Relaxed),
        }
    }
}

impl ServiceMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn priority(&self) -> i32 {
        LOGGING_PRIORITY
    }

    fn hooks(&self) -> MiddlewareHooks {
        MiddlewareHooks::all().observe_only()
    }

    fn before_event(&self, event: ServiceEvent) -> Flow<ServiceEvent> {
        self.events.fetch_add(1, Ordering::Relaxed);
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "Event published"
        );
        Flow::Continue(event)
    }

    fn after_event(&self, event: ServiceEvent, delivered: usize) -> Flow<ServiceEvent> {
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        trace!(event_id = %event.id, delivered, "Event delivered");
        Flow::Continue(event)
    }

    fn before_request(&self, request: ServiceRequest) -> Flow<ServiceRequest> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request.id,
            method = %request.method,
            source = %request.source,
            target = %request.target,
            "Request sent"
        );
        Flow::Continue(request)
    }

    fn after_response(
        &self,
        request: &ServiceRequest,
        response: ServiceResponse,
    ) -> Flow<ServiceResponse> {
        self.responses.fetch_add(1, Ordering::Relaxed);
        if !response.success {
            self.failed_responses.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            request_id = %request.id,
            success = response.success,
            error = response.error.as_deref().unwrap_or(""),
            "Response received"
        );
        Flow::Continue(response)
    }
}
