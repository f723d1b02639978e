//! Domain-level error taxonomy for compliance monitoring.

use cam_state::StorageError;

/// Reasons an evidence item is rejected, checked in this order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceValidationError {
    #[error("evidence id not in expected format (UUID) or missing: {0:?}")]
    InvalidId(String),

    #[error("evidence timestamp is missing")]
    MissingTimestamp,

    #[error("evidence target service is missing")]
    MissingTargetService,

    #[error("evidence includes error: {code}: {description}")]
    CarriesError { code: String, description: String },

    #[error("evidence value is missing")]
    MissingValue,

    #[error("evidence value is not an object")]
    ValueNotObject,

    #[error("evidence value has no resource type list")]
    MissingResourceTypes,

    #[error("evidence resource type at index {0} is not a string")]
    InvalidResourceType(usize),
}

/// Coarse classification used for wire status codes and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    UpstreamUnavailable,
    Storage,
}

impl ErrorKind {
    /// Stable code surfaced to administrative clients.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "already_exists",
            ErrorKind::UpstreamUnavailable => "unavailable",
            ErrorKind::Storage => "internal",
        }
    }
}

/// Compliance monitoring domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CamError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid evidence: {0}")]
    InvalidEvidence(#[from] EvidenceValidationError),

    #[error("monitoring already active for service {0}")]
    AlreadyMonitoring(String),

    #[error("no matching controls found for service {0}")]
    ControlsNotFound(String),

    #[error("no control contains metric {0}")]
    ControlNotFound(String),

    #[error("service {0} is not being monitored")]
    NotMonitored(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("not implemented by upstream: {0}")]
    NotImplemented(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl CamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CamError::Validation(_) | CamError::InvalidEvidence(_) => ErrorKind::Validation,
            CamError::ControlsNotFound(_)
            | CamError::ControlNotFound(_)
            | CamError::NotMonitored(_)
            | CamError::NotFound { .. } => ErrorKind::NotFound,
            CamError::AlreadyMonitoring(_) | CamError::AlreadyExists { .. } => ErrorKind::Conflict,
            CamError::UpstreamUnavailable(_) | CamError::NotImplemented(_) => {
                ErrorKind::UpstreamUnavailable
            }
            CamError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CamError::Validation(msg.into())
    }
}

impl From<StorageError> for CamError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => CamError::NotFound { kind, id },
            StorageError::AlreadyExists { kind, id } => CamError::AlreadyExists { kind, id },
            other => CamError::Storage(other),
        }
    }
}

/// Result type for compliance monitoring domain operations.
pub type Result<T> = std::result::Result<T, CamError>;
