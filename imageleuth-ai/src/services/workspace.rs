//! Batch workspace housekeeping
//!
//! Each batch stores its (renamed) uploads under `temp/<uuid>/`. The
//! directory outlives the request so the archive export can read it, and is
//! discarded when the next batch starts.

use std::io;
use std::path::{Path, PathBuf};

/// Temp directory owned by one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWorkspace {
    path: PathBuf,
}

impl BatchWorkspace {
    /// Allocate a fresh, uniquely named workspace under `temp_root`
    pub async fn create(temp_root: &Path) -> io::Result<Self> {
        let path = temp_root.join(imageleuth_common::uuid_utils::new_id().to_string());
        tokio::fs::create_dir_all(&path).await?;
        tracing::debug!(workspace = %path.display(), "Batch workspace created");
        Ok(Self { path })
    }

    #[cfg(test)]
    pub(crate) fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist one upload under its display name
    pub async fn store(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let target = self.path.join(file_name);
        tokio::fs::write(&target, bytes).await?;
        Ok(target)
    }

    /// Regular, non-hidden files in name order
    pub async fn files(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Remove the workspace; failures are logged, never raised
    pub async fn discard(self) {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => tracing::info!(workspace = %self.path.display(), "Previous batch workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                workspace = %self.path.display(),
                error = %e,
                "Failed to remove batch workspace"
            ),
        }
    }
}

/// Remove every leftover workspace under `temp_root` (startup cleanup)
pub async fn purge_stale_workspaces(temp_root: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(temp_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Delete old export artifacts from `output_dir`; failures are logged only
pub async fn clear_output_dir(output_dir: &Path) -> usize {
    let mut deleted = 0;
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %output_dir.display(), error = %e, "Cannot list output directory");
            }
            return 0;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => deleted += 1,
                    Err(e) => tracing::warn!(file = %path.display(), error = %e, "Cannot delete old export"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %output_dir.display(), error = %e, "Output directory scan aborted");
                break;
            }
        }
    }

    if deleted > 0 {
        tracing::info!(deleted, "Old export files removed");
    }
    deleted
}

/// Strip anything that could escape the workspace
///
/// Drops path components and control characters, then surrounding
/// whitespace and dots. Every other character is kept, so a planned rename
/// such as `Trip (May)_01.jpg` lands in the workspace unchanged.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();

    cleaned.trim().trim_matches('.').trim().to_string()
}

/// Name an upload within the batch
///
/// Index-aligned: the caller-supplied name at the same position wins when it
/// is non-blank, otherwise the sanitized original name. Names that sanitize
/// to nothing become `image_NN` (1-based).
pub fn resolve_display_name(index: usize, original_name: &str, supplied_names: &[String]) -> String {
    let preferred = supplied_names
        .get(index)
        .filter(|name| !name.trim().is_empty())
        .map(|name| sanitize_file_name(name))
        .filter(|name| !name.is_empty());

    preferred
        .or_else(|| Some(sanitize_file_name(original_name)).filter(|name| !name.is_empty()))
        .unwrap_or_else(|| format!("image_{:02}", index + 1))
}
