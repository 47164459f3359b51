use anyhow::{Context, Result};

use voxdrop_client::api_client::RecordingEntry;
use voxdrop_client::ApiClient;

fn format_snr(snr: Option<f64>) -> String {
    match snr {
        Some(snr) => format!("{snr:.1} dB"),
        None => "pending".to_string(),
    }
}

fn format_row(entry: &RecordingEntry) -> String {
    let name = entry.filename.as_deref().unwrap_or("\u{2014}");
    format!(
        "{:<14}  {:>10}  {}  {}  {}",
        entry.status,
        format_snr(entry.snr),
        entry.created_at,
        entry.id,
        name
    )
}

pub async fn run(api: &ApiClient) -> Result<()> {
    let listing = api
        .list_recordings()
        .await
        .context("failed to list recordings")?;

    for entry in &listing.recordings {
        println!("{}", format_row(entry));
    }

    match listing.pagination {
        Some(p) => println!(
            "\n{} recording(s) shown, {} total (page {} of {})",
            listing.recordings.len(),
            p.total,
            p.page,
            p.pages
        ),
        None => println!("\n{} recording(s)", listing.recordings.len()),
    }

    Ok(())
}
