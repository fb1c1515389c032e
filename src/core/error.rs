use http::StatusCode;
use thiserror::Error;

/// Classified fault raised anywhere below the dispatcher boundary.
///
/// Every variant maps onto one response status (see [`TtmError::status`]);
/// the dispatcher never retries.
#[derive(Error, Debug)]
pub enum TtmError {
    /// A required input was missing or malformed.
    #[error("{0}")]
    Argument(String),

    /// Missing datastore/handler registration or a capability mismatch.
    #[error("{0}")]
    Configuration(String),

    /// An entity required by an update/delete was not found.
    #[error("Object {entity}:({id}) not found for {operation}")]
    NotFound {
        entity: String,
        id: String,
        operation: &'static str,
    },

    /// A command, service, service method or resource alias is unknown.
    #[error("{0}")]
    HandlerNotFound(String),

    /// The verb is not supported by the resolved routing mode.
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Anything else.
    #[error("{0}")]
    Unclassified(String),
}

impl TtmError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString, operation: &'static str) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
            operation,
        }
    }

    pub fn handler_not_found(message: impl Into<String>) -> Self {
        Self::HandlerNotFound(message.into())
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::MethodNotAllowed(message.into())
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified(message.into())
    }

    /// HTTP-style status for the response envelope.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::HandlerNotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Argument(_) | Self::Configuration(_) | Self::Unclassified(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code placed next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Argument(_) => "argument",
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } | Self::HandlerNotFound(_) => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Unclassified(_) => "internal",
        }
    }

    /// Whether the message may leak deployment details to callers.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Unclassified(_))
    }
}

pub type Result<T> = std::result::Result<T, TtmError>;

impl<T> From<std::sync::PoisonError<T>> for TtmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Unclassified(format!("Lock poisoned: {err}"))
    }
}

impl From<anyhow::Error> for TtmError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TtmError>() {
            Ok(classified) => classified,
            Err(other) => Self::Unclassified(format!("{other:#}")),
        }
    }
}

impl From<serde_json::Error> for TtmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Argument(format!("Malformed JSON input: {err}"))
    }
}
