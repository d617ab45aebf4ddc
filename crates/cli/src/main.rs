//! `vidgen` -- generate a video from a text prompt.
//!
//! Submits the prompt (and optional reference image) to the Veo API,
//! prints progress while the job runs, and writes the resulting video to
//! disk. Ctrl-C cancels the job.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default | Description                          |
//! |----------------------------|----------|---------|--------------------------------------|
//! | `GEMINI_API_KEY`           | yes      | --      | API key (falls back to `API_KEY`)    |
//! | `VEO_MODEL`                | no       | `veo-2.0-generate-001` | Model id              |
//! | `GENERATION_DEADLINE_SECS` | no       | --      | Give up after this many seconds      |
//!
//! See [`ClientConfig::from_env`] for the full list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidgen_client::config::ClientConfig;
use vidgen_client::job::JobClient;
use vidgen_core::error::GenerationError;
use vidgen_core::progress::ProgressEvent;
use vidgen_core::types::{GenerationRequest, ReferenceImage};

#[derive(Debug, Parser)]
#[command(name = "vidgen", version, about = "Generate a video from a text prompt")]
struct Cli {
    /// Description of the video to generate.
    prompt: String,

    /// Reference image (PNG, JPEG or WebP) the video should start from.
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Where to write the video.
    #[arg(short, long, default_value = "video.mp4")]
    output: PathBuf,

    /// Aspect ratio, e.g. `16:9` or `9:16`.
    #[arg(long)]
    aspect_ratio: Option<String>,

    /// Requested clip length in seconds.
    #[arg(long)]
    duration: Option<u32>,

    /// Override the model id.
    #[arg(long)]
    model: Option<String>,

    /// Give up after this many seconds (overrides `GENERATION_DEADLINE_SECS`).
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Print progress as JSON lines instead of plain text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Layer command-line overrides on top of the environment config.
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(ratio) = &self.aspect_ratio {
            config.parameters.aspect_ratio = Some(ratio.clone());
        }
        if let Some(secs) = self.duration {
            config.parameters.duration_seconds = Some(secs);
        }
        if let Some(secs) = self.deadline_secs {
            config.deadline = Some(Duration::from_secs(secs));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidgen=info,vidgen_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    cli.apply(&mut config);

    let image = match &cli.image {
        Some(path) => Some(load_image(path).await?),
        None => None,
    };
    let request = GenerationRequest::new(cli.prompt.clone(), image)?;
    let client = JobClient::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling generation");
            on_interrupt.cancel();
        }
    });

    let json = cli.json;
    let sink = move |event: ProgressEvent| print_progress(&event, json);

    tracing::info!(model = %config.model, output = %cli.output.display(), "Starting video generation");

    match client.generate_with_cancel(&request, &sink, &cancel).await {
        Ok(bytes) => {
            tokio::fs::write(&cli.output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", cli.output.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), cli.output.display());
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = ?e, "Generation failed");
            if let Some(hint) = failure_hint(&e) {
                eprintln!("{hint}");
            }
            Err(anyhow::anyhow!(e))
        }
    }
}

/// Extra advice printed for failures that may clear up on their own.
fn failure_hint(err: &GenerationError) -> Option<&'static str> {
    err.is_transient()
        .then_some("This is usually temporary; run the same command again in a few minutes.")
}

fn print_progress(event: &ProgressEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode progress event"),
        }
    } else {
        println!("{}", event.message);
    }
}

/// Read a reference image and detect its MIME type from the content,
/// falling back to the file extension.
async fn load_image(path: &Path) -> anyhow::Result<ReferenceImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime_type = image_mime_type(path, &bytes)
        .with_context(|| format!("Cannot determine image type of {}", path.display()))?;
    Ok(ReferenceImage::new(bytes, mime_type)?)
}

fn image_mime_type(path: &Path, bytes: &[u8]) -> anyhow::Result<&'static str> {
    let format = image::guess_format(bytes).or_else(|_| image::ImageFormat::from_path(path))?;
    Ok(format.to_mime_type())
}
