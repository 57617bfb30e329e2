#![forbid(unsafe_code)]

use rsvp_engines::rsvp_intake::IntakeRefuse;
use rsvp_kernel_contracts::ContractViolation;
use rsvp_storage::StorageError;
use thiserror::Error;

/// Failures surfaced by the submission and admin handlers.
#[derive(Debug, Error)]
pub enum RsvpServiceError {
    #[error("invalid JSON body: {0}")]
    InvalidBody(String),
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("confirmation required: pass confirm=YES")]
    MissingConfirmation,
    #[error("unsupported export format `{0}`")]
    UnsupportedFormat(String),
    #[error("cursor is invalid")]
    InvalidCursor,
    #[error("store failure: {0}")]
    StoreFailure(StorageError),
}

impl RsvpServiceError {
    /// Failures the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RsvpServiceError::StoreFailure(_))
    }
}

impl From<IntakeRefuse> for RsvpServiceError {
    fn from(refuse: IntakeRefuse) -> Self {
        match refuse {
            IntakeRefuse::InvalidBody { reason } => RsvpServiceError::InvalidBody(reason),
            other => RsvpServiceError::Validation(other.to_string()),
        }
    }
}

impl From<ContractViolation> for RsvpServiceError {
    fn from(v: ContractViolation) -> Self {
        RsvpServiceError::Validation(v.to_string())
    }
}

impl From<StorageError> for RsvpServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidCursor { .. } => RsvpServiceError::InvalidCursor,
            StorageError::ContractViolation(v) => RsvpServiceError::Validation(v.to_string()),
            other => RsvpServiceError::StoreFailure(other),
        }
    }
}
