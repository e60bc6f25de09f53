//
// models.rs
// Dicom-Inference-Client
//
// Job handles, poll outcomes, and the serializable summaries printed by the CLI.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

use crate::dicom_access::Record;
use crate::error::{Error, Result};

/// Progress reported while the service is still working; the protocol has no finer granularity.
pub const IN_PROGRESS_PERCENT: u8 = 50;
pub const COMPLETE_PERCENT: u8 = 100;

/// Identifies one outstanding remote computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub model_id: String,
    pub segmentation_id: String,
}

impl JobHandle {
    pub fn new(model_id: impl Into<String>, segmentation_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            segmentation_id: segmentation_id.into(),
        }
    }
}

/// Result of a single status poll.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    InProgress { progress_percent: u8, message: String },
    Complete { progress_percent: u8, record: Record },
    NotFound,
    TransportError { reason: String },
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::InProgress { .. })
    }

    pub fn progress_percent(&self) -> Option<u8> {
        match self {
            JobOutcome::InProgress {
                progress_percent, ..
            }
            | JobOutcome::Complete {
                progress_percent, ..
            } => Some(*progress_percent),
            _ => None,
        }
    }

    /// Surface the terminal failure states as errors, naming the job they concern.
    pub fn into_result(self, handle: &JobHandle) -> Result<JobOutcome> {
        match self {
            JobOutcome::NotFound => Err(Error::JobNotFound {
                job_id: handle.segmentation_id.clone(),
                model_id: handle.model_id.clone(),
            }),
            JobOutcome::TransportError { reason } => Err(Error::Transport(reason)),
            other => Ok(other),
        }
    }

    pub fn summary(&self, handle: &JobHandle) -> JobStatusSummary {
        let (state, message) = match self {
            JobOutcome::InProgress { message, .. } => ("in_progress", Some(message.clone())),
            JobOutcome::Complete { .. } => ("complete", None),
            JobOutcome::NotFound => ("not_found", None),
            JobOutcome::TransportError { reason } => ("transport_error", Some(reason.clone())),
        };
        JobStatusSummary {
            model_id: handle.model_id.clone(),
            segmentation_id: handle.segmentation_id.clone(),
            state: state.to_string(),
            progress_percent: self.progress_percent(),
            message,
        }
    }
}

/// Flat, printable view of a poll outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSummary {
    pub model_id: String,
    pub segmentation_id: String,
    pub state: String,
    pub progress_percent: Option<u8>,
    pub message: Option<String>,
}

/// What `submit` sent, kept so the caller can restore results later.
#[derive(Debug, Clone)]
pub struct Submission {
    pub handle: JobHandle,
    pub sent: Vec<Record>,
}
