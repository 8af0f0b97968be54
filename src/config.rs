use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::acquire::{DurationPolicy, DEFAULT_MAX_DURATION_SECS};
use crate::frames::MissingFrame;
use crate::store::Layout;
use crate::transcribe::{TranscriptionOptions, DEFAULT_LANGUAGE, DEFAULT_MODEL, DEFAULT_PROMPT};

#[derive(Debug, Args)]
pub(crate) struct Settings {
    /// Directory downloaded videos are written to
    #[arg(long, env = "CLIPNOTE_VIDEO_DIR", default_value = "movie")]
    pub(crate) video_dir: PathBuf,

    /// Directory for frame and audio artifacts
    #[arg(long, env = "CLIPNOTE_ARTIFACT_DIR", default_value = "static")]
    pub(crate) artifact_dir: PathBuf,

    #[arg(long, env = "CLIPNOTE_LAYOUT", value_enum, default_value_t = Layout::PerVideo)]
    pub(crate) layout: Layout,

    /// Longest video, in seconds, the downloader accepts
    #[arg(long, env = "CLIPNOTE_MAX_DURATION", default_value_t = DEFAULT_MAX_DURATION_SECS)]
    pub(crate) max_duration_secs: f64,

    #[arg(
        long,
        env = "CLIPNOTE_ON_MISSING_FRAME",
        value_enum,
        default_value_t = MissingFrame::Abort
    )]
    pub(crate) on_missing_frame: MissingFrame,

    #[arg(
        long,
        env = "CLIPNOTE_JPEG_QUALITY",
        default_value_t = 90,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub(crate) jpeg_quality: u8,

    /// URL prefix for gallery entries instead of artifact paths
    #[arg(long, env = "CLIPNOTE_GALLERY_PREFIX")]
    pub(crate) gallery_prefix: Option<String>,

    #[arg(long, env = "CLIPNOTE_YT_DLP", default_value = "yt-dlp")]
    pub(crate) yt_dlp: PathBuf,

    #[arg(long, env = "CLIPNOTE_DOWNLOAD_FORMAT", default_value = "best")]
    pub(crate) download_format: String,

    /// 0 disables the timeout
    #[arg(long, env = "CLIPNOTE_DOWNLOAD_TIMEOUT", default_value_t = 600)]
    pub(crate) download_timeout_secs: u64,

    #[arg(long, env = "CLIPNOTE_TRANSCRIPTION_MODEL", default_value = DEFAULT_MODEL)]
    pub(crate) transcription_model: String,

    #[arg(long, env = "CLIPNOTE_TRANSCRIPTION_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub(crate) transcription_language: String,

    #[arg(long, env = "CLIPNOTE_TRANSCRIPTION_PROMPT", default_value = DEFAULT_PROMPT)]
    pub(crate) transcription_prompt: String,

    /// 0 disables the timeout
    #[arg(long, env = "CLIPNOTE_TRANSCRIPTION_TIMEOUT", default_value_t = 300)]
    pub(crate) transcription_timeout_secs: u64,
}

impl Settings {
    pub(crate) fn duration_policy(&self) -> DurationPolicy {
        DurationPolicy {
            max_seconds: self.max_duration_secs,
        }
    }

    pub(crate) fn transcription_options(&self) -> TranscriptionOptions {
        TranscriptionOptions {
            model: self.transcription_model.clone(),
            language: self.transcription_language.clone(),
            prompt: self.transcription_prompt.clone(),
        }
    }

    pub(crate) fn download_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.download_timeout_secs)
    }

    pub(crate) fn transcription_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.transcription_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        Wrapper::try_parse_from(std::iter::once("clipnote").chain(args.iter().copied()))
            .expect("parse")
            .settings
    }

    #[test]
    fn defaults_match_the_commercial_workflow() {
        let settings = parse(&[]);
        assert_eq!(settings.video_dir, PathBuf::from("movie"));
        assert_eq!(settings.artifact_dir, PathBuf::from("static"));
        assert_eq!(settings.layout, Layout::PerVideo);
        assert_eq!(settings.duration_policy(), DurationPolicy::default());
        assert_eq!(settings.on_missing_frame, MissingFrame::Abort);

        let options = settings.transcription_options();
        assert_eq!(options.model, "whisper-1");
        assert_eq!(options.language, "ja");
        assert_eq!(options.prompt, DEFAULT_PROMPT);
        assert_eq!(settings.transcription_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn flags_override_defaults() {
        let settings = parse(&[
            "--layout",
            "flat",
            "--on-missing-frame",
            "skip",
            "--max-duration-secs",
            "60",
            "--transcription-timeout-secs",
            "0",
        ]);
        assert_eq!(settings.layout, Layout::Flat);
        assert_eq!(settings.on_missing_frame, MissingFrame::Skip);
        assert_eq!(settings.duration_policy().max_seconds, 60.0);
        assert_eq!(settings.transcription_timeout(), None);
    }

    #[test]
    fn jpeg_quality_is_bounded() {
        assert!(Wrapper::try_parse_from(["clipnote", "--jpeg-quality", "0"]).is_err());
        assert!(Wrapper::try_parse_from(["clipnote", "--jpeg-quality", "101"]).is_err());
    }

    #[test]
    fn environment_fills_unset_flags() {
        std::env::set_var("CLIPNOTE_DOWNLOAD_FORMAT", "worst");
        let from_env = parse(&[]);
        let from_flag = parse(&["--download-format", "bestaudio"]);
        std::env::remove_var("CLIPNOTE_DOWNLOAD_FORMAT");

        assert_eq!(from_env.download_format, "worst");
        assert_eq!(from_flag.download_format, "bestaudio");
    }
}
