//! Ordered still-image frame source.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::warn;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames read from image files, in order.
///
/// Files that fail to decode are logged and skipped, the same way a
/// dropped camera frame would be.
#[derive(Clone, Debug, Default)]
pub struct ImageSequence {
    paths: VecDeque<PathBuf>,
}

impl ImageSequence {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Every image file directly inside `dir`, sorted by file name.
    pub fn from_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self::from_paths(paths))
    }

    /// A single file, or every image in a directory.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::from_dir(path)
        } else if path.is_file() {
            Ok(Self::from_paths([path]))
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no frames at {}", path.display()),
            ))
        }
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Iterator for ImageSequence {
    type Item = DynamicImage;

    fn next(&mut self) -> Option<DynamicImage> {
        while let Some(path) = self.paths.pop_front() {
            match image::open(&path) {
                Ok(img) => return Some(img),
                Err(e) => warn!("skipping frame {}: {e}", path.display()),
            }
        }
        None
    }
}
