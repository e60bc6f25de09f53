//
// error.rs
// Dicom-Inference-Client
//
// Typed error taxonomy shared by the policy parser, the transform engines, and the job client.
//
// Thales Matheus Mendonça Santos - November 2025

use thiserror::Error;

use crate::policy::TransformMethod;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`], used by callers to decide whether to retry, fix input, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Argument,
    Protocol,
    Lookup,
    Transport,
    Codec,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid transform method: {0}")]
    InvalidMethod(String),

    #[error("Unknown field identifier: {0}")]
    UnknownField(String),

    #[error("Anonymization policy is empty")]
    EmptyPolicy,

    #[error("Field {field} is assigned both {first:?} and {second:?}")]
    ConflictingMethod {
        field: String,
        first: TransformMethod,
        second: TransformMethod,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No input record: {0}")]
    NullInput(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Channel {0} has no records")]
    EmptyChannel(usize),

    #[error("No reference records supplied")]
    EmptyReferenceSet,

    #[error("Service rejected the request: {0}")]
    InvalidRequest(String),

    #[error("Service error: {status} - {reason}")]
    ServiceError { status: u16, reason: String },

    #[error("Unsupported result payload: {0}")]
    UnsupportedPayload(String),

    #[error("Job {job_id} not found for model {model_id}")]
    JobNotFound { job_id: String, model_id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid license credential")]
    InvalidCredential,

    #[error("Record codec error: {0}")]
    Codec(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMethod(_)
            | Error::UnknownField(_)
            | Error::EmptyPolicy
            | Error::ConflictingMethod { .. }
            | Error::Configuration(_) => ErrorKind::Configuration,
            Error::NullInput(_)
            | Error::MissingArgument(_)
            | Error::EmptyChannel(_)
            | Error::EmptyReferenceSet => ErrorKind::Argument,
            Error::InvalidRequest(_) | Error::ServiceError { .. } | Error::UnsupportedPayload(_) => {
                ErrorKind::Protocol
            }
            Error::JobNotFound { .. } => ErrorKind::Lookup,
            Error::Transport(_) | Error::InvalidCredential => ErrorKind::Transport,
            Error::Codec(_) | Error::Archive(_) => ErrorKind::Codec,
        }
    }

    /// Only connection-level failures are worth another attempt; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts surface as ordinary transport failures.
        Error::Transport(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::EmptyPolicy.kind(), ErrorKind::Configuration);
        assert_eq!(Error::EmptyReferenceSet.kind(), ErrorKind::Argument);
        assert_eq!(Error::UnsupportedPayload("2 entries".into()).kind(), ErrorKind::Protocol);
        assert_eq!(
            Error::JobNotFound {
                job_id: "j".into(),
                model_id: "m".into()
            }
            .kind(),
            ErrorKind::Lookup
        );
        assert_eq!(Error::InvalidCredential.kind(), ErrorKind::Transport);
    }

    #[test]
    fn only_transient_transport_errors_are_retryable() {
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(!Error::InvalidCredential.is_retryable());
        assert!(!Error::InvalidRequest("bad".into()).is_retryable());
    }
}
