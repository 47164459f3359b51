//! The contract between a background job scheduler and the uploader.
//!
//! A scheduler persists [`UploadJob`]s, calls [`run_job`] and acts on the
//! returned [`JobOutcome`]: record success, record a terminal failure, or
//! re-enqueue with backoff. Re-running a job with the same inputs is always
//! safe; every run opens a fresh server session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use voxdrop_crypto::hash::sha256_hex;

use crate::api_client::{RecordingMetadata, RecordingsApi};
use crate::error::UploadError;
use crate::upload::{UploadReceipt, Uploader};

fn default_task_id() -> String {
    "default".into()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u16 {
    1
}

/// Everything needed to (re)run an upload without deriving anything again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    pub file_path: PathBuf,
    pub pseudonym: String,
    #[serde(default = "default_task_id")]
    pub task_id: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub length_seconds: f64,
    #[serde(default)]
    pub client_snr: f64,
}

impl UploadJob {
    pub fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata {
            pseudonym: self.pseudonym.clone(),
            task_id: self.task_id.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            length_seconds: self.length_seconds,
            client_snr: self.client_snr,
        }
    }

    /// Stable name for de-duplicating jobs that target the same file.
    pub fn unique_name(&self) -> String {
        let digest = sha256_hex(self.file_path.to_string_lossy().as_bytes());
        format!("upload:{}", &digest[..16])
    }
}

/// Result of one run, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded {
        status: String,
        snr: f64,
        recording_id: Option<String>,
    },
    /// Terminal. `reason` is stable enough to key a UI message on; `detail`
    /// carries whatever the server said.
    Failed {
        reason: String,
        detail: Option<String>,
    },
    /// Try again later. Carries no output.
    Retry,
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::Retry)
    }
}

impl From<Result<UploadReceipt, UploadError>> for JobOutcome {
    fn from(result: Result<UploadReceipt, UploadError>) -> Self {
        match result {
            Ok(receipt) => JobOutcome::Succeeded {
                status: receipt.status,
                snr: receipt.snr,
                recording_id: receipt.recording_id,
            },
            Err(err) if err.is_retryable() => JobOutcome::Retry,
            Err(UploadError::Rejected(rejection)) => JobOutcome::Failed {
                reason: rejection.to_string(),
                detail: Some(rejection.detail().to_string()),
            },
            Err(err) => JobOutcome::Failed {
                reason: err.to_string(),
                detail: None,
            },
        }
    }
}

/// Run one attempt of `job`.
pub async fn run_job<A: RecordingsApi>(uploader: &Uploader<A>, job: &UploadJob) -> JobOutcome {
    let result = uploader
        .upload_file(&job.file_path, &job.metadata())
        .await;

    match &result {
        Ok(receipt) => info!(
            job = %job.unique_name(),
            upload_id = %receipt.upload_id,
            status = %receipt.status,
            "job succeeded"
        ),
        Err(err) if err.is_retryable() => warn!(job = %job.unique_name(), error = %err, "job will be retried"),
        Err(err) => warn!(job = %job.unique_name(), error = %err, "job failed permanently"),
    }

    result.into()
}
