//! Bounded video acquisition.
//!
//! The gate hands a remote downloader a match filter built from the duration
//! policy. The filter runs as soon as metadata is known, so over-long videos
//! are refused before any media bytes are fetched.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::AcquisitionError;
use crate::library::VideoAsset;

pub(crate) const DEFAULT_MAX_DURATION_SECS: f64 = 120.0;

/// Metadata reported by the downloader before the media body is fetched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MediaInfo {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) duration: Option<f64>,
    #[serde(default)]
    pub(crate) ext: String,
}

#[derive(Debug)]
pub(crate) struct DownloadRequest<'a> {
    pub(crate) url: &'a str,
    pub(crate) format: &'a str,
    /// `%(title)s.%(ext)s`-style template for the output file.
    pub(crate) output_template: String,
}

pub(crate) type MatchFilter<'a> = &'a (dyn Fn(&MediaInfo) -> Result<(), AcquisitionError> + Sync);

/// Remote resolver/downloader. Returns the path of the completed file.
pub(crate) trait Downloader {
    async fn download(
        &self,
        request: &DownloadRequest<'_>,
        filter: MatchFilter<'_>,
    ) -> Result<PathBuf, AcquisitionError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DurationPolicy {
    pub(crate) max_seconds: f64,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            max_seconds: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

impl DurationPolicy {
    /// Rejects only a known duration above the ceiling.
    pub(crate) fn check(&self, duration: Option<f64>) -> Result<(), AcquisitionError> {
        match duration {
            Some(duration) if duration > self.max_seconds => {
                Err(AcquisitionError::PolicyRejected {
                    duration,
                    limit: self.max_seconds,
                })
            }
            _ => Ok(()),
        }
    }
}

pub(crate) struct AcquisitionGate<D> {
    downloader: D,
    video_dir: PathBuf,
    format: String,
    policy: DurationPolicy,
}

impl<D: Downloader> AcquisitionGate<D> {
    pub(crate) fn new(
        downloader: D,
        video_dir: impl Into<PathBuf>,
        format: impl Into<String>,
        policy: DurationPolicy,
    ) -> Self {
        Self {
            downloader,
            video_dir: video_dir.into(),
            format: format.into(),
            policy,
        }
    }

    pub(crate) async fn acquire(&self, url: &str) -> Result<VideoAsset, AcquisitionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AcquisitionError::UnsupportedUrl("empty url".to_owned()));
        }

        fs::create_dir_all(&self.video_dir).map_err(|e| {
            AcquisitionError::Unknown(format!(
                "cannot create {}: {e}",
                self.video_dir.display()
            ))
        })?;

        let request = DownloadRequest {
            url,
            format: &self.format,
            output_template: self
                .video_dir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .into_owned(),
        };

        let policy = self.policy;
        let reported = OnceLock::new();
        let filter = |info: &MediaInfo| {
            let _ = reported.set(info.duration);
            match policy.check(info.duration) {
                Ok(()) => {
                    tracing::info!(title = %info.title, ext = %info.ext, duration = ?info.duration, "video accepted");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(title = %info.title, duration = ?info.duration, "video rejected");
                    Err(e)
                }
            }
        };

        tracing::info!(%url, "downloading video");
        let local_path = self.downloader.download(&request, &filter).await?;
        let duration = reported.get().copied().flatten();

        tracing::info!(path = %local_path.display(), "video downloaded");
        Ok(VideoAsset::from_path(local_path, duration))
    }
}

/// Drives the `yt-dlp` binary. The child process is killed if the download
/// future is dropped; yt-dlp keeps unfinished data in a `.part` file, which
/// is never listed as a video.
#[derive(Debug, Clone)]
pub(crate) struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub(crate) fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.kill_on_drop(true);
        command
    }

    async fn metadata(&self, request: &DownloadRequest<'_>) -> Result<MediaInfo, AcquisitionError> {
        let output = self
            .command()
            .args(["--dump-single-json", "--no-playlist", "--skip-download", "-f"])
            .arg(request.format)
            .arg("--")
            .arg(request.url)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        parse_metadata(&output.stdout)
    }

    fn spawn_error(&self, error: std::io::Error) -> AcquisitionError {
        AcquisitionError::Unknown(format!(
            "cannot run {}: {error}",
            self.program.display()
        ))
    }
}

impl Downloader for YtDlp {
    async fn download(
        &self,
        request: &DownloadRequest<'_>,
        filter: MatchFilter<'_>,
    ) -> Result<PathBuf, AcquisitionError> {
        let info = self.metadata(request).await?;
        filter(&info)?;

        let output = self
            .command()
            .args([
                "--no-playlist",
                "--force-overwrites",
                "--no-simulate",
                "--print",
                "after_move:filepath",
                "-f",
            ])
            .arg(request.format)
            .arg("-o")
            .arg(&request.output_template)
            .arg("--")
            .arg(request.url)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        final_path(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            AcquisitionError::Unknown("yt-dlp did not report a file name".to_owned())
        })
    }
}

pub(crate) fn parse_metadata(json: &[u8]) -> Result<MediaInfo, AcquisitionError> {
    serde_json::from_slice(json)
        .map_err(|e| AcquisitionError::Unknown(format!("unexpected yt-dlp metadata: {e}")))
}

/// Last non-empty stdout line, which `--print after_move:filepath` writes.
fn final_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

pub(crate) fn classify_failure(stderr: &str) -> AcquisitionError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("yt-dlp failed without output")
        .trim()
        .to_owned();

    const UNSUPPORTED: [&str; 2] = ["Unsupported URL", "is not a valid URL"];
    const NETWORK: [&str; 6] = [
        "HTTP Error",
        "Unable to download",
        "timed out",
        "Connection",
        "Name or service not known",
        "Temporary failure in name resolution",
    ];

    if UNSUPPORTED.iter().any(|needle| message.contains(needle)) {
        AcquisitionError::UnsupportedUrl(message)
    } else if NETWORK.iter().any(|needle| message.contains(needle)) {
        AcquisitionError::Network(message)
    } else {
        AcquisitionError::Unknown(message)
    }
}
