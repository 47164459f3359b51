pub mod api_client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod job;
pub mod segments;
pub mod upload;

pub use api_client::{ApiClient, RecordingsApi};
pub use error::{Rejection, UploadError};
pub use job::{run_job, JobOutcome, UploadJob};
pub use upload::{Phase, UploadReceipt, Uploader};
