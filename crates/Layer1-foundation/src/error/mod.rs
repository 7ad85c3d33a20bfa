//! Error types for Nexus
//!
//! 레지스트리, 버스, 통신, 플러그인 모두 같은 `Result<T>`를 사용

mod report;

pub use report::ValidationReport;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Nexus 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 서비스 / 플러그인 도메인
    // ========================================================================
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Timeout: {operation} exceeded {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Update failed for {plugin_id}: {reason}")]
    Update { plugin_id: String, reason: String },

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 의존성 그래프 관련 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("{service_id} depends on unregistered service {dependency}")]
    Missing {
        service_id: String,
        dependency: String,
    },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{service_id} still has active dependents: {}", .dependents.join(", "))]
    ActiveDependents {
        service_id: String,
        dependents: Vec<String>,
    },

    #[error("{service_id} requires {dependency} to be active")]
    Inactive {
        service_id: String,
        dependency: String,
    },

    #[error("{service_id} conflicts with active service {other}")]
    Conflict { service_id: String, other: String },

    #[error("{service_id} requires {dependency} {requirement}, found {found}")]
    VersionMismatch {
        service_id: String,
        dependency: String,
        requirement: String,
        found: String,
    },
}

/// 메시지 전달 실패
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("dropped by {middleware}: {reason}")]
    Dropped { middleware: String, reason: String },

    #[error("no responder for {target}:{method}")]
    NoResponder { target: String, method: String },

    #[error("{0} is not running")]
    NotRunning(String),

    #[error("too many concurrent requests (limit {limit})")]
    Overloaded { limit: usize },

    #[error("message {message_id} expired before delivery")]
    Expired { message_id: String },

    #[error("{service_id} is not a participant of channel {channel_id}")]
    NotParticipant {
        service_id: String,
        channel_id: String,
    },
}

/// 에러 분류 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Dependency,
    Delivery,
    Timeout,
    Update,
    NotFound,
    AlreadyExists,
    Config,
    Storage,
    Http,
    Io,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Delivery => "delivery",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Update => "update",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Config => "config",
            ErrorKind::Storage => "storage",
            ErrorKind::Http => "http",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl Error {
    /// 에러 분류
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Dependency(_) => ErrorKind::Dependency,
            Error::Delivery(_) => ErrorKind::Delivery,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Update { .. } => ErrorKind::Update,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Config(_) => ErrorKind::Config,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Http(_) => ErrorKind::Http,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Storage,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Http(_)
                | Error::Delivery(DeliveryError::Overloaded { .. })
        )
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Dependency(_)
                | Error::NotFound { .. }
                | Error::AlreadyExists { .. }
                | Error::Update { .. }
        )
    }

    /// NotFound 생성 헬퍼
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// AlreadyExists 생성 헬퍼
    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    /// Timeout 생성 헬퍼
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Update 에러 생성 헬퍼
    pub fn update(plugin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Update {
            plugin_id: plugin_id.into(),
            reason: reason.into(),
        }
    }

    /// 단일 메시지 검증 실패
    pub fn invalid(message: impl Into<String>) -> Self {
        let mut report = ValidationReport::new();
        report.error(message);
        Error::Validation(report)
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<ValidationReport> for Error {
    fn from(report: ValidationReport) -> Self {
        Error::Validation(report)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
