use crate::provider::ProviderError;
use crate::storage::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No pricing row or endpoint mapping exists for the requested model
    #[error("Invalid configuration or pricing not found")]
    InvalidConfig,

    /// No funding source can cover the quoted cost
    #[error("Insufficient credits")]
    InsufficientCredits,

    /// Model access explicitly disabled for this account
    #[error("Access to {model_version}/{variant} is disabled for this account")]
    AccessDenied { model_version: String, variant: String },

    /// Account is at its concurrent generation cap
    #[error("Too many generations in progress ({current})")]
    ConcurrencyLimitExceeded { current: i64 },

    /// The provider accepted the connection but rejected the job
    #[error("Provider rejected the request: {message}")]
    ProviderRejected { message: String },

    /// The provider could not be reached at all
    #[error("Provider unreachable: {message}")]
    ProviderUnreachable { message: String },

    /// Asset upload to object storage failed
    #[error("Upload failed: {message}")]
    UploadFailed { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Storage operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidConfig => StatusCode::BAD_REQUEST,
            Error::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Error::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::ConcurrencyLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ProviderRejected { .. } => StatusCode::BAD_REQUEST,
            Error::ProviderUnreachable { .. } => StatusCode::BAD_GATEWAY,
            Error::UploadFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidConfig => "Invalid configuration or pricing not found".to_string(),
            Error::InsufficientCredits => {
                "Insufficient credits or no valid provider credential. Check your grants or contact an administrator.".to_string()
            }
            Error::AccessDenied { model_version, variant } => {
                format!("Access to {model_version}/{variant} is disabled for this account")
            }
            Error::ConcurrencyLimitExceeded { current } => {
                format!("Too many generations in progress ({current}). Wait for one to finish before submitting another.")
            }
            Error::ProviderRejected { message } => message.clone(),
            Error::ProviderUnreachable { .. } => "Failed to contact the video provider".to_string(),
            Error::UploadFailed { .. } => "Failed to store the uploaded file".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::ProviderRejected { .. } | Error::ProviderUnreachable { .. } | Error::UploadFailed { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::AccessDenied { .. } | Error::ConcurrencyLimitExceeded { .. } | Error::InsufficientCredits => {
                tracing::info!("Policy rejection: {}", self);
            }
            Error::InvalidConfig | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, self.user_message()).into_response()
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { message, .. } => Error::ProviderRejected { message },
            ProviderError::Transport(e) => Error::ProviderUnreachable { message: e.to_string() },
            ProviderError::InvalidResponse { message } => Error::ProviderUnreachable { message },
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
