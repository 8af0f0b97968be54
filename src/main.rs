mod acquire;
mod ai;
mod capture;
mod config;
mod error;
mod frames;
mod gallery;
mod library;
mod pipeline;
mod store;
mod transcribe;
mod video;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::acquire::{AcquisitionGate, YtDlp};
use crate::ai::OpenAiWhisper;
use crate::capture::FfmpegFrames;
use crate::config::Settings;
use crate::error::AcquisitionError;
use crate::frames::FrameExtractor;
use crate::gallery::GalleryAssembler;
use crate::library::VideoLibrary;
use crate::pipeline::{Annotation, Annotator};
use crate::store::ArtifactStore;
use crate::transcribe::Transcriber;
use crate::video::Mp3Encoder;

#[derive(Parser)]
#[command(name = "clipnote")]
#[command(
    about = "Turn a short video into a per-second storyboard and a time-coded transcript",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a video, refusing anything longer than the duration limit
    Acquire { url: String },
    /// List downloaded videos in name order
    List {
        /// Also read each video's duration
        #[arg(long)]
        probe: bool,
    },
    /// Extract per-second frames and a subtitle transcript for one video
    Annotate {
        /// File name as shown by `list`
        file: String,
        #[arg(long)]
        json: bool,
        /// Embed frames as base64 data URIs instead of file references
        #[arg(long)]
        inline: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;
    let library = VideoLibrary::new(&settings.video_dir);

    match cli.command {
        Command::Acquire { url } => {
            let gate = AcquisitionGate::new(
                YtDlp::new(&settings.yt_dlp),
                library.dir(),
                settings.download_format.as_str(),
                settings.duration_policy(),
            );
            let acquired = match settings.download_timeout() {
                Some(limit) => tokio::time::timeout(limit, gate.acquire(&url))
                    .await
                    .unwrap_or_else(|_| {
                        Err(AcquisitionError::Network(format!(
                            "download did not finish within {}s",
                            limit.as_secs()
                        )))
                    }),
                None => gate.acquire(&url).await,
            };
            let video = acquired.inspect_err(|e| {
                tracing::error!(reason = e.reason(), error = %e, "acquisition failed");
            })?;
            println!("{}", video.file_name());
        }
        Command::List { probe } => {
            for video in library.list()? {
                let duration = if probe {
                    capture::probe_duration(&video.local_path)?
                } else {
                    video.duration_seconds
                };
                match duration {
                    Some(duration) => println!("{}\t{duration:.1}s", video.file_name()),
                    None => println!("{}", video.file_name()),
                }
            }
        }
        Command::Annotate { file, json, inline } => {
            let video = library.select(&file)?;
            let store = ArtifactStore::new(&settings.artifact_dir, settings.layout);
            let assembler =
                GalleryAssembler::new(settings.gallery_prefix.clone(), &settings.artifact_dir);
            let annotator = Annotator::new(
                store.clone(),
                FrameExtractor::new(
                    FfmpegFrames,
                    store.clone(),
                    settings.on_missing_frame,
                    settings.jpeg_quality,
                ),
                Transcriber::new(
                    store,
                    Mp3Encoder::default(),
                    OpenAiWhisper::new(),
                    settings.transcription_options(),
                ),
                assembler.clone(),
                settings.transcription_timeout(),
            );

            let mut annotation = annotator.annotate(&video).await.inspect_err(|e| {
                tracing::error!(video = %video.id, error = %e, "annotation failed");
            })?;
            if inline {
                annotation.gallery = assembler.inline(&annotation.frames)?;
            }
            print_annotation(&annotation, json)?;
        }
    }

    Ok(())
}

fn print_annotation(annotation: &Annotation, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(annotation)?);
        return Ok(());
    }

    println!("video: {}", annotation.video.file_name());
    println!("screenshots: {}", annotation.gallery.len());
    for (index, reference) in annotation.gallery.iter().enumerate() {
        println!("  [{index}] {reference}");
    }
    println!("transcript ({}):", annotation.transcript.language);
    println!("{}", annotation.transcript.text.trim_end());
    Ok(())
}
