use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{StoreError, TranscriptionError};
use crate::library::VideoAsset;
use crate::store::{self, ArtifactKind, ArtifactStore};

pub(crate) const DEFAULT_MODEL: &str = "whisper-1";
pub(crate) const DEFAULT_LANGUAGE: &str = "ja";
pub(crate) const DEFAULT_PROMPT: &str =
    "これは日本のCMの音声です。適切な日本語の字幕を付けてください。";

/// Blocking audio-track extraction.
pub(crate) trait AudioEncoder {
    fn encode(&self, video: &Path, audio: &Path) -> Result<(), TranscriptionError>;
}

/// Remote speech-to-text returning subtitle-formatted text.
pub(crate) trait SpeechToText {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest<'_>,
    ) -> Result<String, TranscriptionError>;
}

#[derive(Debug)]
pub(crate) struct TranscriptionRequest<'a> {
    pub(crate) audio_path: &'a Path,
    pub(crate) model: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) language: &'a str,
}

#[derive(Debug, Clone)]
pub(crate) struct TranscriptionOptions {
    pub(crate) model: String,
    pub(crate) language: String,
    pub(crate) prompt: String,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            language: DEFAULT_LANGUAGE.to_owned(),
            prompt: DEFAULT_PROMPT.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AudioAsset {
    pub(crate) video_id: String,
    pub(crate) file_path: PathBuf,
    pub(crate) codec: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TranscriptResult {
    pub(crate) video_id: String,
    /// Time-coded subtitle text exactly as the service returned it.
    pub(crate) text: String,
    pub(crate) language: String,
}

pub(crate) struct Transcriber<E, S> {
    store: ArtifactStore,
    encoder: Arc<E>,
    speech: S,
    options: TranscriptionOptions,
}

impl<E, S> Transcriber<E, S>
where
    E: AudioEncoder + Send + Sync + 'static,
    S: SpeechToText,
{
    pub(crate) fn new(
        store: ArtifactStore,
        encoder: E,
        speech: S,
        options: TranscriptionOptions,
    ) -> Self {
        Self {
            store,
            encoder: Arc::new(encoder),
            speech,
            options,
        }
    }

    /// Encodes a fresh mp3 next to the other artifacts of `video`. Any audio
    /// left from an earlier run is removed before the encoder starts.
    pub(crate) async fn extract_audio(
        &self,
        video: &VideoAsset,
    ) -> Result<AudioAsset, TranscriptionError> {
        let audio_path = self.store.path_for(
            &video.id,
            ArtifactKind::Audio {
                stem: video.stem(),
            },
        );
        store::remove_file(&audio_path)?;
        if let Some(parent) = audio_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Prepare {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let encoder = Arc::clone(&self.encoder);
        let video_path = video.local_path.clone();
        let target = audio_path.clone();
        tokio::task::spawn_blocking(move || encoder.encode(&video_path, &target))
            .await
            .map_err(|e| TranscriptionError::EncodeFailed(format!("encoder task failed: {e}")))??;

        tracing::info!(video = %video.id, audio = %audio_path.display(), "audio extracted");
        Ok(AudioAsset {
            video_id: video.id.clone(),
            file_path: audio_path,
            codec: "mp3",
        })
    }

    /// Encodes the audio to completion, then submits it. `service_timeout`
    /// bounds only the remote call; the encoder is never abandoned mid-write.
    pub(crate) async fn transcribe(
        &self,
        video: &VideoAsset,
        service_timeout: Option<Duration>,
    ) -> Result<TranscriptResult, TranscriptionError> {
        let audio = self.extract_audio(video).await?;
        tracing::debug!(codec = audio.codec, model = %self.options.model, "submitting audio");

        let request = TranscriptionRequest {
            audio_path: &audio.file_path,
            model: &self.options.model,
            prompt: &self.options.prompt,
            language: &self.options.language,
        };
        let text = match service_timeout {
            Some(limit) => tokio::time::timeout(limit, self.speech.transcribe(&request))
                .await
                .unwrap_or_else(|_| {
                    Err(TranscriptionError::ServiceUnavailable(format!(
                        "no transcript within {}s",
                        limit.as_secs_f64()
                    )))
                })?,
            None => self.speech.transcribe(&request).await?,
        };

        tracing::info!(video = %video.id, chars = text.chars().count(), "transcript received");
        Ok(TranscriptResult {
            video_id: audio.video_id,
            text,
            language: self.options.language.clone(),
        })
    }
}
