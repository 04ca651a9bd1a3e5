//! Attachment bytes on the local filesystem.
//!
//! Every path handed to this module is relative to the upload root and is
//! re-normalised before use, so stored rows and legacy links alike can never
//! resolve outside it.

use crate::error::{AppError, AppResult};
use std::io::{Cursor, ErrorKind};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

pub const THUMBNAIL_PREFIX: &str = "thumb_";
const THUMBNAIL_BOUND: u32 = 300;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative path, or `None` when nothing usable is left
    /// after dropping empty, `.` and `..` segments.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        neutralize(relative).map(|rel| self.root.join(rel))
    }

    /// Writes `data` as `<dir>/<name>` and returns the size reported by the
    /// filesystem afterwards.
    pub async fn write(&self, dir: &str, name: &str, data: &[u8]) -> AppResult<u64> {
        let target_dir = self
            .resolve(dir)
            .ok_or_else(|| AppError::Storage(format!("invalid storage directory '{}'", dir)))?;

        fs::create_dir_all(&target_dir).await.map_err(|e| {
            AppError::Storage(format!(
                "failed to create {}: {}",
                target_dir.display(),
                e
            ))
        })?;

        let target = target_dir.join(name);
        fs::write(&target, data)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", target.display(), e)))?;

        let meta = fs::metadata(&target).await.map_err(|e| {
            AppError::Storage(format!("written file {} not found: {}", target.display(), e))
        })?;
        Ok(meta.len())
    }

    /// Reads a regular file. Missing files and directories are `NotFound`.
    pub async fn read(&self, relative: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(relative).ok_or(AppError::NotFound)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(AppError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AppError::NotFound),
            Err(e) => return Err(e.into()),
        }
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a file; an already-missing file is not an error.
    pub async fn remove(&self, relative: &str) -> AppResult<()> {
        let Some(path) = self.resolve(relative) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a stored file and its thumbnail.
    pub async fn discard(&self, relative: &str) {
        if let Err(e) = self.remove(relative).await {
            tracing::warn!("failed to remove {}: {}", relative, e);
        }
        let thumb = thumbnail_path(relative);
        if let Err(e) = self.remove(&thumb).await {
            tracing::warn!("failed to remove {}: {}", thumb, e);
        }
    }

    /// Writes `thumb_<name>` next to an image, bounded to 300x300.
    pub async fn write_thumbnail(&self, relative: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let target = self
            .resolve(&thumbnail_path(relative))
            .ok_or_else(|| anyhow::anyhow!("invalid thumbnail path for {}", relative))?;

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let img = image::ImageReader::new(Cursor::new(data))
                .with_guessed_format()?
                .decode()?;
            img.thumbnail(THUMBNAIL_BOUND, THUMBNAIL_BOUND).save(&target)?;
            Ok(())
        })
        .await?
    }
}

/// Relative path of the thumbnail belonging to a stored file.
pub fn thumbnail_path(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}{}", dir, THUMBNAIL_PREFIX, name),
        None => format!("{}{}", THUMBNAIL_PREFIX, relative),
    }
}

/// Pixel dimensions from the image header, `None` if the bytes don't decode.
pub fn probe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Splits on both separators and keeps only normal segments.
pub fn neutralize(raw: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for segment in raw.split(['/', '\\']) {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        // A segment like "C:" would still be a prefix component on Windows.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => clean.push(part),
            _ => continue,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
