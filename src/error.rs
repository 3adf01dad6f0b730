use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Forbidden,
    InvalidRequest,
    InvalidDate,
    InvalidStatus,
    NotFound,
    HasPendingFees,
    HasPendingSalary,
    InvalidTarget,
    StoreFailure,
    InvalidState,
    /// Writing a caller-requested output file failed.
    IoFailure,
}

impl ErrorKind {
    /// Wire code carried in the `error.code` field of a response.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidDate => "invalid_date",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::NotFound => "not_found",
            ErrorKind::HasPendingFees => "has_pending_fees",
            ErrorKind::HasPendingSalary => "has_pending_salary",
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::IoFailure => "io_failed",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreFailure, message)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.kind.code(),
            "message": self.message,
        });
        if let Some(d) = &self.details {
            error["details"] = d.clone();
        }
        error
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::store(e.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::store(format!("row decode failed: {e}"))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
