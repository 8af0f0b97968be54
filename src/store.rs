use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Layout {
    /// Every run shares the artifact root and clears all of it.
    Flat,
    /// Each video gets `<root>/<video id>/`, and only that directory is cleared.
    PerVideo,
}

pub(crate) enum ArtifactKind<'a> {
    Frame { index: u32, stem: &'a str },
    Audio { stem: &'a str },
}

/// Directory of derived per-run files (frames, audio).
#[derive(Debug, Clone)]
pub(crate) struct ArtifactStore {
    root: PathBuf,
    layout: Layout,
}

impl ArtifactStore {
    pub(crate) fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub(crate) fn dir_for(&self, namespace: &str) -> PathBuf {
        match self.layout {
            Layout::Flat => self.root.clone(),
            Layout::PerVideo => self.root.join(namespace),
        }
    }

    pub(crate) fn path_for(&self, namespace: &str, kind: ArtifactKind<'_>) -> PathBuf {
        let file_name = match kind {
            ArtifactKind::Frame { index, stem } => format!("{index}_{stem}.jpg"),
            ArtifactKind::Audio { stem } => format!("{stem}.mp3"),
        };
        self.dir_for(namespace).join(file_name)
    }

    /// Deletes every regular file directly inside the namespace directory.
    /// Subdirectories and their contents are left alone.
    pub(crate) fn reset(&self, namespace: &str) -> Result<usize, StoreError> {
        let dir = self.dir_for(namespace);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Prepare {
            path: dir.clone(),
            source,
        })?;

        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Prepare {
            path: dir.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Prepare {
                path: dir.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| StoreError::Prepare {
                path: entry.path(),
                source,
            })?;
            if file_type.is_dir() {
                continue;
            }
            remove_file(&entry.path())?;
            removed += 1;
        }

        tracing::debug!(dir = %dir.display(), removed, "artifact store reset");
        Ok(removed)
    }
}

/// Removes `path` if it exists.
pub(crate) fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_audio_paths_are_deterministic() {
        let store = ArtifactStore::new("static", Layout::Flat);
        assert_eq!(
            store.path_for("ad", ArtifactKind::Frame { index: 3, stem: "ad" }),
            PathBuf::from("static/3_ad.jpg")
        );
        assert_eq!(
            store.path_for("ad", ArtifactKind::Audio { stem: "ad" }),
            PathBuf::from("static/ad.mp3")
        );

        let store = ArtifactStore::new("static", Layout::PerVideo);
        assert_eq!(
            store.path_for("ad", ArtifactKind::Frame { index: 0, stem: "ad" }),
            PathBuf::from("static/ad/0_ad.jpg")
        );
    }

    #[test]
    fn reset_removes_files_but_keeps_subdirectories() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::write(root.path().join("0_old.jpg"), b"x").expect("write");
        fs::write(root.path().join("old.mp3"), b"x").expect("write");
        fs::create_dir(root.path().join("assets")).expect("mkdir");
        fs::write(root.path().join("assets").join("logo.png"), b"x").expect("write");

        let store = ArtifactStore::new(root.path(), Layout::Flat);
        let removed = store.reset("new").expect("reset");

        assert_eq!(removed, 2);
        assert!(!root.path().join("0_old.jpg").exists());
        assert!(!root.path().join("old.mp3").exists());
        assert!(root.path().join("assets").join("logo.png").exists());
    }

    #[test]
    fn reset_creates_missing_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(root.path().join("static"), Layout::Flat);
        assert_eq!(store.reset("a").expect("reset"), 0);
        assert!(root.path().join("static").is_dir());
    }

    #[test]
    fn per_video_reset_only_touches_its_namespace() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(root.path(), Layout::PerVideo);
        store.reset("a").expect("reset a");
        store.reset("b").expect("reset b");
        fs::write(store.path_for("a", ArtifactKind::Frame { index: 0, stem: "a" }), b"x")
            .expect("write");
        fs::write(store.path_for("b", ArtifactKind::Frame { index: 0, stem: "b" }), b"x")
            .expect("write");

        store.reset("a").expect("reset a again");

        assert!(!root.path().join("a").join("0_a.jpg").exists());
        assert!(root.path().join("b").join("0_b.jpg").exists());
    }
}
