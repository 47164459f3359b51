use std::path::PathBuf;

use thiserror::Error;
use voxdrop_crypto::CryptoError;

use crate::api_client::ApiError;
use crate::upload::Phase;

/// Marker the server puts in a rejection body when the recording's SNR is too low.
pub const LOW_QUALITY_MARKER: &str = "low_snr";

/// A permanent refusal by the server. `Display` is stable so callers can match on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    LowQuality { status: u16, detail: String },
    Client { status: u16, detail: String },
}

impl Rejection {
    pub fn from_response(status: u16, body: String) -> Self {
        if body.contains(LOW_QUALITY_MARKER) {
            Rejection::LowQuality {
                status,
                detail: body,
            }
        } else {
            Rejection::Client {
                status,
                detail: body,
            }
        }
    }

    /// Response body exactly as the server sent it.
    pub fn detail(&self) -> &str {
        match self {
            Rejection::LowQuality { detail, .. } | Rejection::Client { detail, .. } => detail,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Rejection::LowQuality { status, .. } | Rejection::Client { status, .. } => *status,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::LowQuality { .. } => {
                write!(f, "recording rejected by server ({LOW_QUALITY_MARKER})")
            }
            Rejection::Client { status, .. } => write!(f, "client error {status}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read source file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transient failure while {phase}: {message}")]
    Transient { phase: Phase, message: String },

    #[error("{0}")]
    Rejected(Rejection),

    #[error("server issued an unusable session token for upload {upload_id}")]
    InvalidSessionToken { upload_id: String },

    #[error("server published an unusable public key: {0}")]
    MalformedKey(#[source] CryptoError),

    #[error("encryption failed: {0}")]
    Crypto(#[source] CryptoError),
}

impl UploadError {
    /// Whether a fresh attempt with the same inputs may succeed.
    ///
    /// Every 4xx counts as permanent, including ones a fixed request might get
    /// past; the retry layer never sees them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transient { .. })
    }

    /// Classify a failed call made after the key fetch.
    pub(crate) fn from_api(phase: Phase, err: ApiError) -> Self {
        match err {
            ApiError::Status { status, body } if status.is_client_error() => {
                UploadError::Rejected(Rejection::from_response(status.as_u16(), body))
            }
            other => UploadError::Transient {
                phase,
                message: other.to_string(),
            },
        }
    }
}

impl From<CryptoError> for UploadError {
    fn from(err: CryptoError) -> Self {
        if matches!(err, CryptoError::MalformedKey(_)) {
            UploadError::MalformedKey(err)
        } else {
            UploadError::Crypto(err)
        }
    }
}
