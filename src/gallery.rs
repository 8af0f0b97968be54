use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::error::StoreError;
use crate::frames::FrameArtifact;

/// Ordered frame references, index `i` being the frame at second `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub(crate) struct Gallery {
    entries: Vec<String>,
}

impl Gallery {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GalleryAssembler {
    prefix: Option<String>,
    artifact_root: PathBuf,
}

impl GalleryAssembler {
    /// With a prefix, entries become `<prefix>/<path below artifact_root>`,
    /// keeping any per-video directory; otherwise the artifact path itself is
    /// the reference.
    pub(crate) fn new(prefix: Option<String>, artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.map(|p| p.trim_end_matches('/').to_owned()),
            artifact_root: artifact_root.into(),
        }
    }

    pub(crate) fn assemble(&self, frames: &[FrameArtifact]) -> Gallery {
        let entries = frames
            .iter()
            .map(|frame| match &self.prefix {
                Some(prefix) => format!("{prefix}/{}", self.relative(&frame.file_path)),
                None => frame.file_path.display().to_string(),
            })
            .collect();
        Gallery { entries }
    }

    /// `/`-joined path of `path` below the artifact root. Paths outside the
    /// root fall back to the bare file name.
    fn relative(&self, path: &Path) -> String {
        let Ok(relative) = path.strip_prefix(&self.artifact_root) else {
            return path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
        };
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Embeds every frame as a `data:image/jpeg;base64,` URI.
    pub(crate) fn inline(&self, frames: &[FrameArtifact]) -> Result<Gallery, StoreError> {
        let entries = frames
            .iter()
            .map(|frame| -> Result<String, StoreError> {
                let jpeg_data = fs::read(&frame.file_path).map_err(|source| StoreError::Read {
                    path: frame.file_path.clone(),
                    source,
                })?;
                Ok("data:image/jpeg;base64,".to_owned() + &BASE64_STANDARD.encode(jpeg_data))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Gallery { entries })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn frames(paths: &[&str]) -> Vec<FrameArtifact> {
        paths
            .iter()
            .enumerate()
            .map(|(i, path)| FrameArtifact {
                index: i as u32,
                video_id: "ad".into(),
                file_path: PathBuf::from(path),
            })
            .collect()
    }

    #[test]
    fn keeps_extraction_order_one_entry_per_frame() {
        let frames = frames(&["static/0_ad.jpg", "static/1_ad.jpg", "static/2_ad.jpg"]);
        let gallery = GalleryAssembler::default().assemble(&frames);

        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.get(0), Some("static/0_ad.jpg"));
        assert_eq!(gallery.get(2), Some("static/2_ad.jpg"));
        assert_eq!(gallery.get(3), None);
    }

    #[test]
    fn prefix_replaces_artifact_root_and_keeps_video_dir() {
        let frames = frames(&["static/ad/0_ad.jpg", "static/ad/1_ad.jpg"]);
        let gallery =
            GalleryAssembler::new(Some("./app/static/".into()), "static").assemble(&frames);

        let entries: Vec<_> = gallery.iter().collect();
        assert_eq!(entries, vec!["./app/static/ad/0_ad.jpg", "./app/static/ad/1_ad.jpg"]);
    }

    #[test]
    fn prefix_on_flat_layout_is_prefix_and_file_name() {
        let frames = frames(&["static/0_ad.jpg"]);
        let gallery = GalleryAssembler::new(Some("/media".into()), "static").assemble(&frames);
        assert_eq!(gallery.get(0), Some("/media/0_ad.jpg"));
    }

    #[test]
    fn frames_outside_the_root_fall_back_to_file_name() {
        let frames = frames(&["elsewhere/ad/0_ad.jpg"]);
        let gallery = GalleryAssembler::new(Some("/media".into()), "static").assemble(&frames);
        assert_eq!(gallery.get(0), Some("/media/0_ad.jpg"));
    }

    #[test]
    fn empty_frames_give_empty_gallery() {
        let gallery = GalleryAssembler::default().assemble(&[]);
        assert!(gallery.is_empty());
        assert_eq!(serde_json::to_string(&gallery).unwrap(), "[]");
    }

    #[test]
    fn inline_embeds_jpeg_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0_ad.jpg");
        fs::write(&path, [0xff, 0xd8, 0xff]).expect("write");
        let frames = vec![FrameArtifact {
            index: 0,
            video_id: "ad".into(),
            file_path: path,
        }];

        let gallery = GalleryAssembler::default().inline(&frames).expect("inline");
        assert_eq!(gallery.get(0), Some("data:image/jpeg;base64,/9j/"));
    }
}
