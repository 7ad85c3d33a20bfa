//! Service Bus - 발행/구독 이벤트와 요청/응답 호출
//!
//! ## 전달 규칙
//!
//! - `publish`는 동기: before 체인 → 구독자(등록 순서) → after 체인
//! - 같은 출처가 발행한 이벤트는 발행 순서대로 각 구독자에게 도착
//! - `request`는 (target, method) 응답자 하나를 기다리며 타임아웃 안에서만 대기
//! - 응답자 에러/패닉은 `success: false` 응답으로 변환되어 호출자에게 전파되지 않음

use super::message::{ServiceEvent, ServiceRequest, ServiceResponse};
use super::middleware::{MiddlewarePipeline, ServiceMiddleware};
use crate::subscription::{SubscriptionId, SubscriptionIds};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_foundation::{BusConfig, DeliveryError, Error, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Handler 타입
// ============================================================================

/// 이벤트 구독 핸들러 (동기)
pub type EventHandler = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

/// 요청 응답자
///
/// 타임아웃이 나도 응답자 실행은 강제로 중단되지 않는다.
/// 오래 걸리는 응답자는 `cancel`을 확인해야 한다.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: ServiceRequest, cancel: CancellationToken) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(ServiceRequest, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn handle(&self, request: ServiceRequest, cancel: CancellationToken) -> Result<Value> {
        (self.0)(request, cancel).await
    }
}

/// 클로저를 응답자로 변환
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(ServiceRequest, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ============================================================================
// EventPattern - 구독 패턴
// ============================================================================

/// `*` (전체), `prefix.*` (접두사), 그 외 정확히 일치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
    All,
    Prefix(String),
    Exact(String),
}

impl EventPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Self::All
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            Self::Prefix(format!("{}.", prefix))
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => event_type.starts_with(prefix.as_str()),
            Self::Exact(exact) => exact == event_type,
        }
    }
}

struct Subscriber {
    pattern: EventPattern,
    handler: EventHandler,
}

// ============================================================================
// 요청 추적 / 통계
// ============================================================================

/// 진행 중인 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRequest {
    pub id: String,
    pub method: String,
    pub source: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
}

/// 요청이 끝나면 (어떤 경로로든) 목록에서 제거
struct ActiveRequestGuard<'a> {
    bus: &'a ServiceBus,
    id: String,
}

impl Drop for ActiveRequestGuard<'_> {
    fn drop(&mut self) {
        self.bus.active.write().remove(&self.id);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub events_published: u64,
    pub events_dropped: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub requests_timed_out: u64,
    pub subscribers: usize,
    pub responders: usize,
    pub buffered: usize,
}

#[derive(Default)]
struct Counters {
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    requests_sent: AtomicU64,
    requests_failed: AtomicU64,
    requests_timed_out: AtomicU64,
}

// ============================================================================
// ServiceBus
// ============================================================================

pub struct ServiceBus {
    config: BusConfig,
    pipeline: MiddlewarePipeline,
    subscribers: RwLock<HashMap<SubscriptionId, Arc<Subscriber>>>,
    subscription_ids: SubscriptionIds,
    responders: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    responders_changed: Notify,
    active: RwLock<HashMap<String, ActiveRequest>>,
    running: AtomicBool,
    buffer: Mutex<VecDeque<ServiceEvent>>,
    counters: Counters,
}

fn responder_key(target: &str, method: &str) -> String {
    format!("{}:{}", target, method)
}

impl ServiceBus {
    /// 새 버스 생성 (실행 상태, 미들웨어 없음)
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            pipeline: MiddlewarePipeline::new(),
            subscribers: RwLock::new(HashMap::new()),
            subscription_ids: SubscriptionIds::new(),
            responders: RwLock::new(HashMap::new()),
            responders_changed: Notify::new(),
            active: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            buffer: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// 실행 재개 후 정지 중 쌓인 이벤트를 순서대로 전달
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending: Vec<ServiceEvent> = self.buffer.lock().drain(..).collect();
        info!(buffered = pending.len(), "Service bus started");
        for event in pending {
            if let Err(e) = self.deliver(event) {
                debug!(error = %e, "Buffered event dropped on flush");
            }
        }
    }

    /// 정지 (이벤트는 버퍼링, 요청은 거부)
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Service bus stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Middleware
    // ========================================================================

    pub fn add_middleware(&self, middleware: Arc<dyn ServiceMiddleware>) {
        self.pipeline.add(middleware);
    }

    pub fn remove_middleware(&self, name: &str) -> bool {
        self.pipeline.remove(name)
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.pipeline.names()
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    // ========================================================================
    // Publish / Subscribe
    // ========================================================================

    /// 구독 (`*`, `prefix.*`, 정확한 타입)
    pub fn subscribe(&self, pattern: &str, handler: EventHandler) -> SubscriptionId {
        let id = self.subscription_ids.next();
        self.subscribers.write().insert(
            id,
            Arc::new(Subscriber {
                pattern: EventPattern::parse(pattern),
                handler,
            }),
        );
        debug!(subscription_id = %id, pattern = pattern, "Bus subscriber added");
        id
    }

    /// 구독 해제 (없는 ID는 무시)
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// 이벤트 발행
    ///
    /// 전달된 구독자 수를 반환한다. 미들웨어가 drop하면 `DeliveryError::Dropped`.
    /// 정지 중에는 버퍼에 보관하고 0을 반환한다.
    pub fn publish(&self, event: ServiceEvent) -> Result<usize> {
        if !self.is_running() {
            let mut buffer = self.buffer.lock();
            buffer.push_back(event);
            while buffer.len() > self.config.event_buffer_size {
                if let Some(evicted) = buffer.pop_front() {
                    warn!(event_id = %evicted.id, "Event buffer full, oldest event evicted");
                }
            }
            return Ok(0);
        }

        self.deliver(event)
    }

    /// before 체인을 통과한 이벤트를 `local`에 먼저 넘긴 뒤 구독자에게 전달
    ///
    /// 버퍼링하지 않으므로 정지 상태면 `NotRunning`.
    /// `local`이 실패하면 구독자 전달과 after 체인 없이 그 에러를 돌려준다.
    /// 반환값은 `local`과 구독자 전달 수의 합.
    pub fn publish_with<F>(&self, event: ServiceEvent, local: F) -> Result<usize>
    where
        F: FnOnce(&ServiceEvent) -> Result<usize>,
    {
        if !self.is_running() {
            return Err(DeliveryError::NotRunning("service bus".into()).into());
        }
        self.deliver_with(event, local)
    }

    fn deliver(&self, event: ServiceEvent) -> Result<usize> {
        self.deliver_with(event, |_| Ok(0))
    }

    fn deliver_with<F>(&self, event: ServiceEvent, local: F) -> Result<usize>
    where
        F: FnOnce(&ServiceEvent) -> Result<usize>,
    {
        self.counters.events_published.fetch_add(1, Ordering::Relaxed);

        let event = match self.pipeline.run_before_event(event) {
            Ok(event) => event,
            Err(e) => {
                self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let mut delivered = local(&event)?;

        let mut targets: Vec<(SubscriptionId, Arc<Subscriber>)> = self
            .subscribers
            .read()
            .iter()
            .filter(|(_, s)| s.pattern.matches(&event.event_type))
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        for (id, subscriber) in targets {
            let handler = &subscriber.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(subscription_id = %id, event_id = %event.id, "Subscriber panicked"),
            }
        }

        // after 체인의 drop은 이미 끝난 전달에 영향 없음
        if let Err(e) = self.pipeline.run_after_event(event, delivered) {
            debug!(error = %e, "After-event chain stopped");
        }
        Ok(delivered)
    }

    // ========================================================================
    // Request / Response
    // ========================================================================

    /// 응답자 등록 (같은 target:method는 교체)
    pub fn respond(&self, target: &str, method: &str, handler: Arc<dyn RequestHandler>) {
        let key = responder_key(target, method);
        if self.responders.write().insert(key.clone(), handler).is_some() {
            warn!(responder = %key, "Responder replaced");
        }
        self.responders_changed.notify_waiters();
    }

    pub fn unrespond(&self, target: &str, method: &str) -> bool {
        self.responders
            .write()
            .remove(&responder_key(target, method))
            .is_some()
    }

    fn responder(&self, target: &str, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.responders
            .read()
            .get(&responder_key(target, method))
            .cloned()
    }

    /// 요청 전송
    ///
    /// - 미들웨어 drop, 응답자 에러/패닉, 응답자 부재 → `Ok(success: false)`
    /// - 응답자가 기한 내 응답하지 않음 → `Err(Timeout)`
    /// - 정지 상태 / 동시 요청 한도 초과 → `Err(Delivery)`
    pub async fn request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        if !self.is_running() {
            return Err(DeliveryError::NotRunning("service bus".to_string()).into());
        }

        let timeout = request
            .timeout()
            .unwrap_or_else(|| self.config.default_timeout());
        let deadline = Instant::now() + timeout;
        let request_id = request.id.clone();

        let _guard = {
            let mut active = self.active.write();
            if active.len() >= self.config.max_concurrent_requests {
                return Err(DeliveryError::Overloaded {
                    limit: self.config.max_concurrent_requests,
                }
                .into());
            }
            active.insert(
                request_id.clone(),
                ActiveRequest {
                    id: request_id.clone(),
                    method: request.method.clone(),
                    source: request.source.clone(),
                    target: request.target.clone(),
                    started_at: Utc::now(),
                },
            );
            ActiveRequestGuard {
                bus: self,
                id: request_id.clone(),
            }
        };
        self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);

        let request = match self.pipeline.run_before_request(request) {
            Ok(request) => request,
            Err(e) => {
                self.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
                return Ok(ServiceResponse::failure(request_id, e.to_string()));
            }
        };

        let handler = match self.wait_for_responder(&request, deadline).await {
            Some(handler) => handler,
            None => {
                self.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
                let err: Error = DeliveryError::NoResponder {
                    target: request.target.clone(),
                    method: request.method.clone(),
                }
                .into();
                debug!(request_id = %request_id, error = %err, "Request unanswered");
                return Ok(ServiceResponse::failure(request_id, err.to_string()));
            }
        };

        // 응답자는 별도 태스크에서 실행 (타임아웃 후에도 계속 실행될 수 있음)
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let request = request.clone();
            let cancel = cancel.clone();
            async move { handler.handle(request, cancel).await }
        });

        let response = match tokio::time::timeout_at(deadline, task).await {
            Err(_) => {
                cancel.cancel();
                self.counters.requests_timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    request_id = %request_id,
                    method = %request.method,
                    target = %request.target,
                    "Request timed out"
                );
                return Err(Error::timeout(
                    format!("request {}:{}", request.target, request.method),
                    timeout,
                ));
            }
            Ok(Ok(Ok(data))) => ServiceResponse::ok(&request_id, data),
            Ok(Ok(Err(e))) => ServiceResponse::failure(&request_id, e.to_string()),
            Ok(Err(join_error)) => {
                warn!(request_id = %request_id, error = %join_error, "Responder panicked");
                ServiceResponse::failure(&request_id, format!("responder failed: {}", join_error))
            }
        };

        let response = match self.pipeline.run_after_response(&request, response) {
            Ok(response) => response,
            Err(e) => ServiceResponse::failure(&request_id, e.to_string()),
        };

        if !response.success {
            self.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(response)
    }

    /// 기한까지 응답자 등록을 기다림
    async fn wait_for_responder(
        &self,
        request: &ServiceRequest,
        deadline: Instant,
    ) -> Option<Arc<dyn RequestHandler>> {
        loop {
            let notified = self.responders_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(handler) = self.responder(&request.target, &request.method) {
                return Some(handler);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// 진행 중인 요청 목록
    pub fn active_requests(&self) -> Vec<ActiveRequest> {
        let mut requests: Vec<ActiveRequest> = self.active.read().values().cloned().collect();
        requests.sort_by_key(|r| r.started_at);
        requests
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            events_published: self.counters.events_published.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            requests_sent: self.counters.requests_sent.load(Ordering::Relaxed),
            requests_failed: self.counters.requests_failed.load(Ordering::Relaxed),
            requests_timed_out: self.counters.requests_timed_out.load(Ordering::Relaxed),
            subscribers: self.subscribers.read().len(),
            responders: self.responders.read().len(),
            buffered: self.buffer.lock().len(),
        }
    }
}

impl Default for ServiceBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::middleware::{
        Flow, LoggingMiddleware, MiddlewareHooks, SecurityMiddleware, ValidationMiddleware,
    };
    use nexus_foundation::SecurityConfig;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn recording_handler(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventHandler {
        Arc::new(move |event: &ServiceEvent| {
            log.lock()
                .push(format!("{}:{}", tag, event.payload["n"].as_i64().unwrap_or(-1)));
        })
    }

    #[tokio::test]
    async fn test_publish_preserves_per_source_order() {
        let bus = ServiceBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("data.changed", recording_handler(log.clone(), "s1"));

        for n in 0..5 {
            bus.publish(ServiceEvent::new("data.changed", "catalog", json!({ "n": n })))
                .unwrap();
        }

        assert_eq!(
            *log.lock(),
            vec!["s1:0", "s1:1", "s1:2", "s1:3", "s1:4"]
        );
    }

    #[tokio::test]
    async fn test_subscribers_in_registration_order() {
        let bus = ServiceBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("*", recording_handler(log.clone(), "all"));
        bus.subscribe("data.*", recording_handler(log.clone(), "prefix"));
        bus.subscribe("user.action", recording_handler(log.clone(), "other"));

        let delivered = bus
            .publish(ServiceEvent::new("data.changed", "catalog", json!({ "n": 1 })))
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock(), vec!["all:1", "prefix:1"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = ServiceBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = bus.subscribe(
            "*",
            Arc::new(move |_: &ServiceEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(ServiceEvent::new("data.changed", "a", json!({}))).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    struct CountingStage {
        name: &'static str,
        priority: i32,
        calls: Arc<AtomicUsize>,
    }

    impl ServiceMiddleware for CountingStage {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn hooks(&self) -> MiddlewareHooks {
            MiddlewareHooks::none().with_before_event().observe_only()
        }
        fn before_event(&self, event: ServiceEvent) -> Flow<ServiceEvent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Flow::Continue(event)
        }
    }

    #[tokio::test]
    async fn test_security_drop_skips_later_stages() {
        let bus = ServiceBus::default();
        bus.add_middleware(Arc::new(SecurityMiddleware::new(SecurityConfig {
            blocked_sources: vec!["mallory".into()],
            ..SecurityConfig::default()
        })));
        let validation_calls = Arc::new(AtomicUsize::new(0));
        let logging_calls = Arc::new(AtomicUsize::new(0));
        bus.add_middleware(Arc::new(CountingStage {
            name: "validation-probe",
            priority: 50,
            calls: validation_calls.clone(),
        }));
        bus.add_middleware(Arc::new(CountingStage {
            name: "logging-probe",
            priority: 100,
            calls: logging_calls.clone(),
        }));

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        bus.subscribe(
            "*",
            Arc::new(move |_: &ServiceEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let err = bus
            .publish(ServiceEvent::new("data.changed", "mallory", json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(DeliveryError::Dropped { .. })));
        assert_eq!(validation_calls.load(Ordering::SeqCst), 0);
        assert_eq!(logging_calls.load(Ordering::SeqCst), 0);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        bus.publish(ServiceEvent::new("data.changed", "alice", json!({})))
            .unwrap();
        assert_eq!(validation_calls.load(Ordering::SeqCst), 1);
        assert_eq!(logging_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().events_dropped, 1);
    }

    #[tokio::test]
    async fn test_standard_middleware_order() {
        let bus = ServiceBus::default();
        bus.add_middleware(Arc::new(LoggingMiddleware::new()));
        bus.add_middleware(Arc::new(ValidationMiddleware::default()));
        bus.add_middleware(Arc::new(SecurityMiddleware::default()));
        assert_eq!(
            bus.middleware_names(),
            vec!["security", "validation", "logging"]
        );
        assert!(bus.remove_middleware("validation"));
        assert_eq!(bus.middleware_names(), vec!["security", "logging"]);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = ServiceBus::default();
        bus.subscribe("*", Arc::new(|_: &ServiceEvent| panic!("subscriber bug")));
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("*", recording_handler(log.clone(), "ok"));

        let delivered = bus
            .publish(ServiceEvent::new("data.changed", "a", json!({ "n": 7 })))
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["ok:7"]);
    }

    #[tokio::test]
    async fn test_stopped_bus_buffers_and_flushes() {
        let bus = ServiceBus::new(BusConfig {
            event_buffer_size: 2,
            ..BusConfig::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("*", recording_handler(log.clone(), "s"));

        bus.stop();
        for n in 0..3 {
            assert_eq!(
                bus.publish(ServiceEvent::new("data.changed", "a", json!({ "n": n })))
                    .unwrap(),
                0
            );
        }
        assert!(log.lock().is_empty());
        assert_eq!(bus.stats().buffered, 2);

        let err = bus
            .request(ServiceRequest::new("a", "b", "get", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(DeliveryError::NotRunning(_))));

        bus.start();
        assert_eq!(*log.lock(), vec!["s:1", "s:2"]);
        assert_eq!(bus.stats().buffered, 0);
    }

    #[tokio::test]
    async fn test_request_response() {
        let bus = ServiceBus::default();
        bus.respond(
            "catalog",
            "catalog.lookup",
            handler_fn(|req, _cancel| async move {
                Ok(json!({ "sku": req.params["sku"], "price": 10 }))
            }),
        );

        let response = bus
            .request(ServiceRequest::new(
                "pricing",
                "catalog",
                "catalog.lookup",
                json!({ "sku": "A1" }),
            ))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.data["sku"], "A1");
        assert!(bus.active_requests().is_empty());
    }

    #[tokio::test]
    async fn test_responder_error_becomes_failure() {
        let bus = ServiceBus::default();
        bus.respond(
            "catalog",
            "get",
            handler_fn(|_req, _cancel| async move { Err(Error::Internal("db down".into())) }),
        );

        let response = bus
            .request(ServiceRequest::new("a", "catalog", "get", json!({})))
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("db down"));
    }

    #[tokio::test]
    async fn test_responder_panic_becomes_failure() {
        let bus = ServiceBus::default();
        bus.respond(
            "catalog",
            "get",
            handler_fn(|_req, _cancel| async move {
                if true {
                    panic!("responder bug");
                }
                Ok(Value::Null)
            }),
        );

        let response = bus
            .request(ServiceRequest::new("a", "catalog", "get", json!({})))
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(bus.stats().requests_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_responder_fails_at_deadline() {
        let bus = ServiceBus::default();
        let timeout = Duration::from_millis(500);
        let started = Instant::now();

        let response = bus
            .request(ServiceRequest::new("a", "ghost", "get", json!({})).with_timeout(timeout))
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("no responder"));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_responder_times_out_and_is_cancelled() {
        let bus = ServiceBus::default();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        bus.respond(
            "slow",
            "get",
            handler_fn(move |_req, cancel| {
                let flag = flag.clone();
                async move {
                    cancel.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        );

        let err = bus
            .request(
                ServiceRequest::new("a", "slow", "get", json!({}))
                    .with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(bus.stats().requests_timed_out, 1);

        for _ in 0..10 {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_responder_is_used() {
        let bus = Arc::new(ServiceBus::default());
        let late = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            late.respond(
                "late",
                "get",
                handler_fn(|_req, _cancel| async move { Ok(json!("here")) }),
            );
        });

        let response = bus
            .request(
                ServiceRequest::new("a", "late", "get", json!({}))
                    .with_timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.data, json!("here"));
    }

    #[tokio::test]
    async fn test_blocked_request_is_failure_response() {
        let bus = ServiceBus::default();
        bus.add_middleware(Arc::new(SecurityMiddleware::new(SecurityConfig {
            blocked_methods: vec!["delete".into()],
            ..SecurityConfig::default()
        })));
        bus.respond(
            "catalog",
            "delete",
            handler_fn(|_req, _cancel| async move { Ok(Value::Null) }),
        );

        let response = bus
            .request(ServiceRequest::new("a", "catalog", "delete", json!({})))
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn test_overloaded() {
        let bus = Arc::new(ServiceBus::new(BusConfig {
            max_concurrent_requests: 1,
            ..BusConfig::default()
        }));
        let gate = Arc::new(Notify::new());
        let wait = gate.clone();
        bus.respond(
            "svc",
            "get",
            handler_fn(move |_req, _cancel| {
                let wait = wait.clone();
                async move {
                    wait.notified().await;
                    Ok(Value::Null)
                }
            }),
        );

        let first = tokio::spawn({
            let bus = bus.clone();
            async move {
                bus.request(ServiceRequest::new("a", "svc", "get", json!({})))
                    .await
            }
        });
        while bus.active_requests().is_empty() {
            tokio::task::yield_now().await;
        }

        let err = bus
            .request(ServiceRequest::new("a", "svc", "get", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(DeliveryError::Overloaded { limit: 1 })));

        // notify_waiters는 이미 대기 중인 태스크만 깨운다
        while !first.is_finished() {
            gate.notify_waiters();
            tokio::task::yield_now().await;
        }
        assert!(first.await.unwrap().unwrap().success);
    }
}
