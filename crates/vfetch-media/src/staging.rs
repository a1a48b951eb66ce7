//! Temporary storage for uploaded videos awaiting scene detection.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MediaResult;

/// Default staging directory for uploads.
pub const DEFAULT_UPLOAD_DIR: &str = "/tmp/video_uploads";

const FALLBACK_STEM: &str = "uploaded_file";

/// Make a client-supplied filename safe to use on disk.
///
/// Directory components are dropped. Characters other than ASCII
/// alphanumerics, `-` and `_` in the stem become `_`, and surrounding `_`
/// are trimmed. The extension is kept when it is alphanumeric.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (base, None),
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    let stem = if cleaned.is_empty() {
        FALLBACK_STEM
    } else {
        cleaned
    };

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

/// Upload staging directory.
#[derive(Debug, Clone)]
pub struct UploadStaging {
    dir: PathBuf,
}

impl UploadStaging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First free path for a sanitized name, suffixing `_1`, `_2`, ...
    pub fn unique_path(&self, sanitized: &str) -> PathBuf {
        let candidate = self.dir.join(sanitized);
        if !candidate.exists() {
            return candidate;
        }

        let (stem, ext) = match sanitized.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (sanitized, None),
        };

        (1u32..)
            .map(|n| match ext {
                Some(ext) => self.dir.join(format!("{}_{}.{}", stem, n, ext)),
                None => self.dir.join(format!("{}_{}", stem, n)),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// Write upload bytes to a fresh file and return its path.
    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.unique_path(&sanitize_filename(original_name));
        tokio::fs::write(&path, bytes).await?;

        info!(
            original = %original_name,
            path = %path.display(),
            size_bytes = bytes.len(),
            "Staged upload"
        );
        Ok(path)
    }

    /// Delete a staged file. Returns whether a file was removed.
    pub async fn remove(&self, path: &Path) -> MediaResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed staged file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for UploadStaging {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_DIR)
    }
}
