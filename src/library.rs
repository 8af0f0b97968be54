use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::LibraryError;

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mkv", "mov", "m4v"];

/// A fully downloaded video on local disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct VideoAsset {
    /// File stem, i.e. the source title the downloader named the file after.
    pub(crate) id: String,
    pub(crate) local_path: PathBuf,
    pub(crate) duration_seconds: Option<f64>,
    pub(crate) ext: String,
}

impl VideoAsset {
    pub(crate) fn from_path(path: impl Into<PathBuf>, duration_seconds: Option<f64>) -> Self {
        let local_path = path.into();
        let id = local_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = local_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            local_path,
            duration_seconds,
            ext,
        }
    }

    pub(crate) fn stem(&self) -> &str {
        &self.id
    }

    pub(crate) fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub(crate) fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// The directory the acquisition gate downloads into.
#[derive(Debug, Clone)]
pub(crate) struct VideoLibrary {
    dir: PathBuf,
}

impl VideoLibrary {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Complete videos in lexicographic file-name order. Partial downloads
    /// (`.part`, `.ytdl`) never match a video extension and are skipped.
    pub(crate) fn list(&self) -> Result<Vec<VideoAsset>, LibraryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LibraryError::Io {
                    dir: self.dir.clone(),
                    source,
                })
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LibraryError::Io {
                dir: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && is_video_file(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(paths
            .into_iter()
            .map(|path| VideoAsset::from_path(path, None))
            .collect())
    }

    pub(crate) fn select(&self, name: &str) -> Result<VideoAsset, LibraryError> {
        self.list()?
            .into_iter()
            .find(|asset| asset.file_name() == name)
            .ok_or_else(|| LibraryError::NotFound {
                name: name.to_owned(),
                dir: self.dir.clone(),
            })
    }
}
