//! Stable error codes and the `OperationResult` envelope returned at subsystem
//! boundaries, plus the shared retry/backoff helper used by everything that
//! talks to the embedded store or an external sink.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Stable, wire-safe error code. Subsystem errors convert into one of these
/// at the boundary; nothing above that boundary matches on subsystem-specific
/// error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AuthInvalid,
    AuthExpired,
    DbUnavailable,
    DbSlow,
    DbConstraint,
    CollectorDisconnected,
    CollectorTimeout,
    PipelineFull,
    PipelineDropped,
    PipelineBackpressure,
    ValidationFailed,
    RateLimited,
    NotFound,
    Conflict,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthInvalid => "E_AUTH_INVALID",
            Self::AuthExpired => "E_AUTH_EXPIRED",
            Self::DbUnavailable => "E_DB_UNAVAILABLE",
            Self::DbSlow => "E_DB_SLOW",
            Self::DbConstraint => "E_DB_CONSTRAINT",
            Self::CollectorDisconnected => "E_COLLECTOR_DISCONNECTED",
            Self::CollectorTimeout => "E_COLLECTOR_TIMEOUT",
            Self::PipelineFull => "E_PIPELINE_FULL",
            Self::PipelineDropped => "E_PIPELINE_DROPPED",
            Self::PipelineBackpressure => "E_PIPELINE_BACKPRESSURE",
            Self::ValidationFailed => "E_VALIDATION_FAILED",
            Self::RateLimited => "E_RATE_LIMITED",
            Self::NotFound => "E_NOT_FOUND",
            Self::Conflict => "E_CONFLICT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Success/error-code/message envelope returned at subsystem boundaries.
///
/// Leaf operations (store, queue, network) convert infrastructure errors into
/// one of these; higher layers propagate the envelope rather than matching on
/// the infrastructure error type directly.
#[derive(Debug, Clone)]
pub struct OperationResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            value: Some(value),
            error_code: None,
            error_message: None,
        }
    }

    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }
}

/// Errors raised by the embedded telemetry store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store not initialized")]
    NotInitialized,
    #[error("operation cancelled")]
    Cancelled,
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<&StoreError> for ErrorCode {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::Database(_) => ErrorCode::DbUnavailable,
            StoreError::Serialization(_) => ErrorCode::DbConstraint,
            StoreError::NotInitialized => ErrorCode::DbUnavailable,
            StoreError::Cancelled => ErrorCode::DbUnavailable,
        }
    }
}

/// Errors raised by the store-and-forward spill queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors raised by the motor baseline learner.
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    #[error("no operation mode matched")]
    NoModeMatched,
    #[error("insufficient samples: have {have}, need {need}")]
    InsufficientSamples { have: usize, need: usize },
}

/// Errors raised by the health assessment engine.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("no baseline for device {0}")]
    NoBaseline(String),
    #[error("insufficient window data")]
    InsufficientData,
    #[error("invalid tag glob pattern: {0}")]
    InvalidPattern(String),
}

/// Errors raised by the prognostics engine (trend/degradation/RUL).
#[derive(Debug, Error)]
pub enum PrognosticsError {
    #[error("insufficient history: have {have}, need {need}")]
    InsufficientHistory { have: usize, need: usize },
    #[error("no degradation model applicable for tag {0}")]
    NoApplicableModel(String),
}

/// Errors raised by the retention and aggregation workers.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("unknown aggregation table: {0}")]
    UnknownTable(String),
    #[error("retention operation failed: {0}")]
    Operation(String),
}

/// Which class of error a caller is dealing with, for retry policy selection.
/// Mirrors the taxonomy in §7 of the design: validation never retries,
/// transient infrastructure retries with backoff, conflicts are swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Transient,
    Conflict,
    ResourceExhaustion,
    Fatal,
}

impl From<&StoreError> for ErrorClass {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::Database(_) => ErrorClass::Transient,
            StoreError::Serialization(_) => ErrorClass::Validation,
            StoreError::NotInitialized => ErrorClass::Fatal,
            StoreError::Cancelled => ErrorClass::Transient,
        }
    }
}

/// Bounded exponential backoff policy, selected per error class.
///
/// `base_ms * mult^attempt`, capped at `cap_ms`, for up to `max_tries` attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub mult: f64,
    pub cap_ms: u64,
    pub max_tries: u32,
}

impl RetryPolicy {
    /// The default policy for transient infrastructure errors (DB/network).
    pub const fn transient() -> Self {
        Self {
            base_ms: 200,
            mult: 2.0,
            cap_ms: 30_000,
            max_tries: 5,
        }
    }

    /// A tighter policy for in-process alarm-write retries (§4.4: max 3 tries).
    pub const fn alarm_write() -> Self {
        Self {
            base_ms: 100,
            mult: 2.0,
            cap_ms: 2_000,
            max_tries: 3,
        }
    }

    pub fn for_class(class: ErrorClass) -> Option<Self> {
        match class {
            ErrorClass::Transient => Some(Self::transient()),
            ErrorClass::Validation | ErrorClass::Conflict | ErrorClass::Fatal => None,
            ErrorClass::ResourceExhaustion => Some(Self::transient()),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_ms as f64 * self.mult.powi(attempt as i32);
        Duration::from_millis((raw as u64).min(self.cap_ms))
    }
}

/// Run `op` under `policy`, retrying on `Err` until it succeeds or the
/// policy's `max_tries` is exhausted. Logs a warning on each retry.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_tries {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(%label, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
