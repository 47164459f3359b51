use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxdrop_client::config::ClientConfig;
use voxdrop_client::{credentials, ApiClient, UploadJob, Uploader};

mod commands;

#[derive(Parser)]
#[command(
    name = "voxdrop",
    version,
    about = "voxdrop client: encrypt and upload voice recordings"
)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and upload one or more recordings
    Upload {
        /// WAV files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Participant pseudonym
        #[arg(long)]
        pseudonym: String,
        /// Task identifier
        #[arg(long)]
        task_id: Option<String>,
        /// Sample rate in Hz
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Channel count
        #[arg(long)]
        channels: Option<u16>,
        /// Recording length in seconds
        #[arg(long, default_value_t = 0.0)]
        length_seconds: f64,
        /// Signal-to-noise ratio measured on the device
        #[arg(long, default_value_t = 0.0)]
        client_snr: f64,
    },
    /// Show the server's current public key
    PublicKey,
    /// List uploaded recordings
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxdrop=info,voxdrop_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?;
    let user_token = credentials::acquire_user_token(&config.server)?;
    let api = ApiClient::from_config(&config.server, user_token)
        .context("failed to build HTTP client")?;

    match cli.command {
        Commands::Upload {
            files,
            pseudonym,
            task_id,
            sample_rate,
            channels,
            length_seconds,
            client_snr,
        } => {
            let defaults = &config.upload;
            let jobs = files
                .into_iter()
                .map(|file_path| UploadJob {
                    file_path,
                    pseudonym: pseudonym.clone(),
                    task_id: task_id
                        .clone()
                        .unwrap_or_else(|| defaults.default_task_id.clone()),
                    sample_rate: sample_rate.unwrap_or(defaults.default_sample_rate),
                    channels: channels.unwrap_or(defaults.default_channels),
                    length_seconds,
                    client_snr,
                })
                .collect();
            commands::upload::run(Arc::new(Uploader::new(api)), jobs).await?;
        }
        Commands::PublicKey => {
            commands::public_key::run(&api).await?;
        }
        Commands::List => {
            commands::list::run(&api).await?;
        }
    }

    Ok(())
}
