//! Enrolled-face gallery backed by a directory of images.
//!
//! Each `.jpg`, `.jpeg` or `.png` file contributes one identity named after
//! its file stem. The gallery is rebuilt wholesale on every load and replaced
//! by value by its owner, never patched in place.

use crate::perception::FaceAnalyzer;
use crate::types::EnrolledFace;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid identity name {0:?}")]
    InvalidName(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// In-memory set of known identities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    faces: Vec<EnrolledFace>,
}

impl Gallery {
    pub fn new(faces: Vec<EnrolledFace>) -> Self {
        let mut gallery = Self::default();
        for face in faces {
            gallery.insert(face);
        }
        gallery
    }

    /// Scan `dir` and embed the first face of every image file.
    ///
    /// Files are visited in file-name order. Images that fail to decode or
    /// contain no face are skipped with a warning. A missing directory is
    /// created and yields an empty gallery.
    pub fn load(dir: &Path, analyzer: &mut dyn FaceAnalyzer) -> Result<Self, GalleryError> {
        std::fs::create_dir_all(dir).map_err(|source| GalleryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut gallery = Gallery::default();
        for path in image_files(dir)? {
            let Some(name) = identity_name(&path) else {
                continue;
            };

            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable gallery image; skipping");
                    continue;
                }
            };

            let faces = match analyzer.analyze(&image) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "face analysis failed; skipping");
                    continue;
                }
            };

            let Some(face) = faces.into_iter().next() else {
                tracing::warn!(path = %path.display(), "no face detected; skipping");
                continue;
            };

            gallery.insert(EnrolledFace {
                name,
                embedding: face.embedding,
            });
        }

        tracing::info!(dir = %dir.display(), faces = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    /// Persist an enrollment crop as `<name>.jpg`, replacing any file of that
    /// name. Other image files with the same stem (`<name>.png`, `<name>.JPEG`,
    /// ...) are removed so the reload resolves the identity to the new crop.
    pub fn write_source(dir: &Path, name: &str, face: &RgbImage) -> Result<PathBuf, GalleryError> {
        if !is_valid_name(name) {
            return Err(GalleryError::InvalidName(name.to_string()));
        }
        std::fs::create_dir_all(dir).map_err(|source| GalleryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(format!("{name}.jpg"));
        face.save(&path).map_err(|source| GalleryError::Write {
            path: path.clone(),
            source,
        })?;

        remove_stale_sources(dir, name, &path)?;

        tracing::info!(path = %path.display(), "saved new face");
        Ok(path)
    }

    /// Add an identity. A later entry with an existing name replaces the
    /// earlier embedding in place.
    fn insert(&mut self, face: EnrolledFace) {
        match self.faces.iter_mut().find(|f| f.name == face.name) {
            Some(existing) => {
                tracing::debug!(name = %face.name, "duplicate identity; later file wins");
                *existing = face;
            }
            None => self.faces.push(face),
        }
    }

    pub fn faces(&self) -> &[EnrolledFace] {
        &self.faces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnrolledFace> {
        self.faces.iter()
    }

    pub fn get(&self, name: &str) -> Option<&EnrolledFace> {
        self.faces.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Whether `name` can be used as a gallery file stem.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn image_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn remove_stale_sources(dir: &Path, name: &str, keep: &Path) -> Result<(), GalleryError> {
    for path in image_files(dir)? {
        if path == keep || identity_name(&path).as_deref() != Some(name) {
            continue;
        }
        std::fs::remove_file(&path).map_err(|source| GalleryError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "removed superseded gallery image");
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn identity_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}
