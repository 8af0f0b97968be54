use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{AnnotateError, ExtractionError};
use crate::frames::{FrameArtifact, FrameExtractor, FrameSource};
use crate::gallery::{Gallery, GalleryAssembler};
use crate::library::VideoAsset;
use crate::store::ArtifactStore;
use crate::transcribe::{AudioEncoder, SpeechToText, TranscriptResult, Transcriber};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Annotation {
    pub(crate) video: VideoAsset,
    #[serde(skip)]
    pub(crate) frames: Vec<FrameArtifact>,
    pub(crate) gallery: Gallery,
    pub(crate) transcript: TranscriptResult,
}

/// Runs one annotation at a time: reset, then frames and transcript side by side.
pub(crate) struct Annotator<F, E, S> {
    store: ArtifactStore,
    extractor: Arc<FrameExtractor<F>>,
    transcriber: Transcriber<E, S>,
    assembler: GalleryAssembler,
    transcription_timeout: Option<Duration>,
    run_lock: Mutex<()>,
}

impl<F, E, S> Annotator<F, E, S>
where
    F: FrameSource + Send + Sync + 'static,
    E: AudioEncoder + Send + Sync + 'static,
    S: SpeechToText,
{
    pub(crate) fn new(
        store: ArtifactStore,
        extractor: FrameExtractor<F>,
        transcriber: Transcriber<E, S>,
        assembler: GalleryAssembler,
        transcription_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            extractor: Arc::new(extractor),
            transcriber,
            assembler,
            transcription_timeout,
            run_lock: Mutex::new(()),
        }
    }

    pub(crate) async fn annotate(&self, video: &VideoAsset) -> Result<Annotation, AnnotateError> {
        let _run = self.run_lock.lock().await;

        let removed = self.store.reset(&video.id)?;
        tracing::info!(video = %video.id, removed, "annotation run started");

        let extractor = Arc::clone(&self.extractor);
        let asset = video.clone();
        let frames = async move {
            tokio::task::spawn_blocking(move || extractor.extract_frames(&asset))
                .await
                .unwrap_or_else(|e| {
                    Err(ExtractionError::UnreadableVideo {
                        path: video.local_path.clone(),
                        message: format!("extraction task failed: {e}"),
                    })
                })
        };

        // Both branches always run to completion so no writer outlives the run lock.
        // The timeout covers only the remote call, after the audio is written.
        let transcript = self
            .transcriber
            .transcribe(video, self.transcription_timeout);
        let (frames, transcript) = tokio::join!(frames, transcript);
        let frames = frames?;
        let transcript = transcript?;

        let gallery = self.assembler.assemble(&frames);
        tracing::info!(video = %video.id, frames = gallery.len(), "annotation run finished");

        Ok(Annotation {
            video: video.clone(),
            frames,
            gallery,
            transcript,
        })
    }
}
