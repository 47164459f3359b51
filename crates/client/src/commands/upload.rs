use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::task::JoinSet;

use voxdrop_client::{run_job, ApiClient, JobOutcome, UploadJob, Uploader};

/// Run every job concurrently, one independent attempt each.
pub async fn run(uploader: Arc<Uploader<ApiClient>>, jobs: Vec<UploadJob>) -> Result<()> {
    let mut set = JoinSet::new();
    for (index, job) in jobs.iter().cloned().enumerate() {
        let uploader = Arc::clone(&uploader);
        set.spawn(async move {
            tracing::info!(job = %job.unique_name(), file = %job.file_path.display(), "uploading");
            (index, run_job(&uploader, &job).await)
        });
    }

    let mut outcomes = Vec::with_capacity(jobs.len());
    while let Some(joined) = set.join_next().await {
        outcomes.push(joined.context("upload task panicked")?);
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut unfinished = 0;
    for (index, outcome) in &outcomes {
        let path = jobs[*index].file_path.display();
        match outcome {
            JobOutcome::Succeeded {
                status,
                snr,
                recording_id,
            } => {
                let id = recording_id.as_deref().unwrap_or("\u{2014}");
                println!("Uploaded: {path} -> {status} (SNR {snr:.1} dB, recording {id})");
            }
            JobOutcome::Failed { reason, .. } => {
                unfinished += 1;
                println!("Rejected: {path}: {reason}");
            }
            JobOutcome::Retry => {
                unfinished += 1;
                println!("Deferred: {path}: temporary failure, try again later");
            }
        }
    }

    if unfinished > 0 {
        bail!("{unfinished} of {} upload(s) did not complete", outcomes.len());
    }
    Ok(())
}
