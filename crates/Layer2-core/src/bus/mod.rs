//! # Service Bus
//!
//! 미들웨어 파이프라인 위에 구축된 발행/구독 + 요청/응답
//!
//! - `message`: ServiceEvent / ServiceRequest / ServiceResponse
//! - `middleware`: Security(10) → Validation(50) → Logging(100)
//! - `service_bus`: ServiceBus

mod message;
pub mod middleware;
mod service_bus;

pub use message::{ServiceEvent, ServiceRequest, ServiceResponse};
pub(crate) use message::is_expired;
pub use middleware::{
    Flow, LoggingMiddleware, MiddlewareHooks, MiddlewarePipeline, SecurityMiddleware,
    ServiceMiddleware, ValidationMiddleware,
};
pub use service_bus::{
    handler_fn, ActiveRequest, BusStats, EventHandler, EventPattern, RequestHandler, ServiceBus,
};
