//! S3 Transfer command line
//!
//! A thin front end over [`s3_transfer::TransferEngine`]: connection
//! parameters come from flags or environment variables, results are printed
//! as JSON and progress goes to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s3_transfer::s3::{ConnectionDescriptor, StaticResolver};
use s3_transfer::transfer::{ProgressSink, UploadFile};
use s3_transfer::{ProgressEvent, TransferConfig, TransferEngine};

const CONNECTION_ID: &str = "cli";

#[derive(Debug, Parser)]
#[command(
    name = "s3-transfer",
    version,
    about = "Transfer objects to and from S3-compatible buckets"
)]
struct Cli {
    /// Endpoint URL or host; empty uses the AWS default
    #[arg(long, env = "S3_ENDPOINT", default_value = "")]
    endpoint: String,

    #[arg(long, env = "S3_BUCKET")]
    bucket: String,

    #[arg(long, env = "S3_ACCESS_KEY_ID")]
    access_key_id: String,

    #[arg(long, env = "S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: String,

    #[arg(long, env = "S3_REGION", default_value = "")]
    region: String,

    /// Use path-style addressing (required by most self-hosted stores)
    #[arg(long, env = "S3_FORCE_PATH_STYLE")]
    path_style: bool,

    /// Use https for endpoints given without a scheme
    #[arg(long, env = "S3_USE_SSL")]
    ssl: bool,

    /// Transfer config file; defaults to the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List folders and files under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Upload a file
    Put {
        path: PathBuf,
        #[arg(long, default_value = "")]
        prefix: String,
        /// Object name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Download an object
    Get { key: String, dest: PathBuf },
    /// Delete an object
    Rm { key: String },
    /// Delete every object under a prefix
    Rmdir { prefix: String },
    /// Create an empty folder marker
    Mkdir { key: String },
}

impl Cli {
    fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: CONNECTION_ID.to_string(),
            display_name: "command line".to_string(),
            endpoint_host: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            access_key_secret: self.secret_access_key.clone(),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            use_ssl: self.ssl,
            force_path_style: self.path_style,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize result")?
    );
    Ok(())
}

fn progress_printer() -> Arc<dyn ProgressSink> {
    Arc::new(|event: ProgressEvent| {
        eprint!(
            "\r{}: {}/{} bytes",
            event.file_id, event.bytes_transferred, event.total_bytes
        );
        if event.bytes_transferred == event.total_bytes {
            eprintln!();
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting S3 Transfer v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => TransferConfig::load_from(path)?,
        None => TransferConfig::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            TransferConfig::default()
        }),
    };

    let engine = TransferEngine::new(config)?;
    let resolver = StaticResolver::new().with_connection(cli.descriptor());

    // Ctrl-C cancels the running operation; multipart uploads are aborted first
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match &cli.command {
        Command::Ls { prefix } => {
            let listing = engine.list(&resolver, CONNECTION_ID, prefix, &cancel).await?;
            for folder in &listing.folders {
                tracing::debug!("folder {}", folder);
            }
            for file in &listing.files {
                tracing::debug!("{} {}", file.display_name(), file.size_string());
            }
            print_json(&listing)?;
        }
        Command::Put { path, prefix, name } => {
            let request = UploadFile {
                prefix: prefix.clone(),
                path: path.clone(),
                file_name: name.clone(),
            };
            let result = engine
                .upload_file(&resolver, CONNECTION_ID, &request, progress_printer(), &cancel)
                .await?;
            print_json(&result)?;
        }
        Command::Get { key, dest } => {
            let result = engine
                .download_file(&resolver, CONNECTION_ID, key, dest, progress_printer(), &cancel)
                .await?;
            print_json(&result)?;
        }
        Command::Rm { key } => {
            let result = engine
                .delete_object(&resolver, CONNECTION_ID, key, &cancel)
                .await?;
            print_json(&result)?;
        }
        Command::Rmdir { prefix } => {
            let result = engine
                .delete_folder(&resolver, CONNECTION_ID, prefix, &cancel)
                .await?;
            print_json(&result)?;
        }
        Command::Mkdir { key } => {
            let result = engine
                .create_folder(&resolver, CONNECTION_ID, key, &cancel)
                .await?;
            print_json(&result)?;
        }
    }

    Ok(())
}
