use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::codecs::jpeg;
use image::RgbImage;
use serde::Serialize;

use crate::error::{ExtractionError, StoreError};
use crate::library::VideoAsset;
use crate::store::{self, ArtifactKind, ArtifactStore};

pub(crate) type FrameSink<'a> = dyn FnMut(u32, RgbImage) -> Result<(), ExtractionError> + 'a;

/// Decoded frames of a video, sampled on whole seconds.
pub(crate) trait FrameSource {
    fn duration(&self, video: &Path) -> Result<Option<f64>, ExtractionError>;

    /// Hands `sink` the frame on screen at each whole second in `0..seconds`,
    /// in ascending order, from a single decode pass.
    fn sample(
        &self,
        video: &Path,
        seconds: u32,
        sink: &mut FrameSink<'_>,
    ) -> Result<(), ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum MissingFrame {
    /// Stop at the first second without a frame.
    Abort,
    /// Log the gap and keep going.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct FrameArtifact {
    pub(crate) index: u32,
    pub(crate) video_id: String,
    pub(crate) file_path: PathBuf,
}

/// Number of whole seconds in `duration`.
pub(crate) fn whole_seconds(duration: f64) -> u32 {
    if !duration.is_finite() || duration <= 0.0 {
        return 0;
    }
    duration.floor().min(f64::from(u32::MAX)) as u32
}

pub(crate) struct FrameExtractor<S> {
    source: S,
    store: ArtifactStore,
    on_missing: MissingFrame,
    jpeg_quality: u8,
}

impl<S: FrameSource> FrameExtractor<S> {
    pub(crate) fn new(
        source: S,
        store: ArtifactStore,
        on_missing: MissingFrame,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            source,
            store,
            on_missing,
            jpeg_quality,
        }
    }

    /// Writes `{i}_{stem}.jpg` for every whole second of `video` and returns
    /// the artifacts in ascending index order. Expects the store namespace to
    /// have been reset already.
    pub(crate) fn extract_frames(
        &self,
        video: &VideoAsset,
    ) -> Result<Vec<FrameArtifact>, ExtractionError> {
        let duration = match video.duration_seconds {
            Some(duration) => duration,
            None => self.source.duration(&video.local_path)?.ok_or_else(|| {
                ExtractionError::UnreadableVideo {
                    path: video.local_path.clone(),
                    message: "container reports no duration".to_owned(),
                }
            })?,
        };
        let seconds = whole_seconds(duration);
        if seconds == 0 {
            tracing::info!(video = %video.id, duration, "video shorter than one second, no frames");
            return Ok(Vec::new());
        }

        let mut frames = Vec::with_capacity(seconds as usize);
        let mut expected = 0;
        let sampled = self.source.sample(&video.local_path, seconds, &mut |second, image| {
            if second < expected {
                return Err(ExtractionError::FrameCapture {
                    second,
                    message: format!("frame delivered out of order, expected {expected}s"),
                });
            }
            self.check_gap(expected..second)?;
            frames.push(self.write_frame(video, second, &image)?);
            expected = second + 1;
            Ok(())
        });
        let result = sampled.and_then(|()| self.check_gap(expected..seconds));

        if let Err(e) = result {
            discard(&frames);
            return Err(e);
        }

        tracing::info!(video = %video.id, frames = frames.len(), "frames extracted");
        Ok(frames)
    }

    fn check_gap(&self, missing: std::ops::Range<u32>) -> Result<(), ExtractionError> {
        if missing.is_empty() {
            return Ok(());
        }
        match self.on_missing {
            MissingFrame::Abort => Err(ExtractionError::FrameCapture {
                second: missing.start,
                message: "no decodable frame".to_owned(),
            }),
            MissingFrame::Skip => {
                tracing::warn!(from = missing.start, to = missing.end, "skipping seconds without a frame");
                Ok(())
            }
        }
    }

    fn write_frame(
        &self,
        video: &VideoAsset,
        second: u32,
        pixels: &RgbImage,
    ) -> Result<FrameArtifact, ExtractionError> {
        let file_path = self.store.path_for(
            &video.id,
            ArtifactKind::Frame {
                index: second,
                stem: video.stem(),
            },
        );

        let mut jpeg_data = Vec::new();
        let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, self.jpeg_quality);
        encoder
            .encode(
                pixels,
                pixels.width(),
                pixels.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| ExtractionError::FrameCapture {
                second,
                message: e.to_string(),
            })?;
        fs::write(&file_path, jpeg_data).map_err(|source| StoreError::Write {
            path: file_path.clone(),
            source,
        })?;

        Ok(FrameArtifact {
            index: second,
            video_id: video.id.clone(),
            file_path,
        })
    }
}

/// Removes frames of an aborted run so no partial gallery is left behind.
fn discard(frames: &[FrameArtifact]) {
    for frame in frames {
        if let Err(e) = store::remove_file(&frame.file_path) {
            tracing::warn!(error = %e, "failed to discard partial frame");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::Layout;

    /// Emits a tiny solid image for every second except `missing`.
    pub(crate) struct FakeFrames {
        pub(crate) duration: Option<f64>,
        pub(crate) missing: Vec<u32>,
    }

    impl FrameSource for FakeFrames {
        fn duration(&self, _video: &Path) -> Result<Option<f64>, ExtractionError> {
            Ok(self.duration)
        }

        fn sample(
            &self,
            _video: &Path,
            seconds: u32,
            sink: &mut FrameSink<'_>,
        ) -> Result<(), ExtractionError> {
            for second in (0..seconds).filter(|s| !self.missing.contains(s)) {
                sink(second, RgbImage::from_pixel(4, 4, image::Rgb([second as u8, 0, 0])))?;
            }
            Ok(())
        }
    }

    fn extractor(
        root: &Path,
        duration: Option<f64>,
        missing: Vec<u32>,
        on_missing: MissingFrame,
    ) -> FrameExtractor<FakeFrames> {
        let store = ArtifactStore::new(root, Layout::Flat);
        store.reset("clip").expect("reset");
        FrameExtractor::new(FakeFrames { duration, missing }, store, on_missing, 90)
    }

    #[test]
    fn whole_seconds_truncates() {
        assert_eq!(whole_seconds(7.8), 7);
        assert_eq!(whole_seconds(120.0), 120);
        assert_eq!(whole_seconds(0.99), 0);
        assert_eq!(whole_seconds(0.0), 0);
        assert_eq!(whole_seconds(-1.0), 0);
        assert_eq!(whole_seconds(f64::NAN), 0);
    }

    #[test]
    fn one_frame_per_whole_second_in_order() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), Some(7.8), vec![], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        let frames = extractor.extract_frames(&video).expect("extract");

        assert_eq!(frames.len(), 7);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i as u32);
            assert_eq!(frame.video_id, "clip");
            assert_eq!(frame.file_path, root.path().join(format!("{i}_clip.jpg")));
            assert!(frame.file_path.is_file());
        }
    }

    #[test]
    fn known_duration_skips_probe() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), None, vec![], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", Some(3.2));

        assert_eq!(extractor.extract_frames(&video).expect("extract").len(), 3);
    }

    #[test]
    fn sub_second_video_yields_no_frames() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), Some(0.5), vec![], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        assert!(extractor.extract_frames(&video).expect("extract").is_empty());
    }

    #[test]
    fn unknown_duration_is_unreadable() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), None, vec![], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        let err = extractor.extract_frames(&video).unwrap_err();
        assert!(matches!(err, ExtractionError::UnreadableVideo { .. }));
    }

    #[test]
    fn missing_second_aborts_and_cleans_up() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), Some(5.0), vec![2], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        let err = extractor.extract_frames(&video).unwrap_err();

        assert!(matches!(err, ExtractionError::FrameCapture { second: 2, .. }));
        let leftover = fs::read_dir(root.path()).expect("read_dir").count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn missing_tail_is_reported() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), Some(4.0), vec![3], MissingFrame::Abort);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        let err = extractor.extract_frames(&video).unwrap_err();
        assert!(matches!(err, ExtractionError::FrameCapture { second: 3, .. }));
    }

    #[test]
    fn skip_policy_keeps_remaining_frames() {
        let root = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(root.path(), Some(5.0), vec![1, 3], MissingFrame::Skip);
        let video = VideoAsset::from_path("movie/clip.mp4", None);

        let frames = extractor.extract_frames(&video).expect("extract");
        let indices: Vec<_> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }
}
