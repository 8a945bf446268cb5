//! File-storage collaborator. The rest of the service only ever sees the
//! path strings handed back by `store`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use slug::slugify;
use tokio::fs;
use uuid::Uuid;

use crate::error::AppError;

/// Public URL prefix for stored uploads.
const PUBLIC_PREFIX: &str = "/uploads/";

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists `bytes` and returns the stored path.
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, AppError>;

    /// Removes a stored file. A file that is already gone is not an error.
    async fn delete(&self, stored_path: &str) -> Result<(), AppError>;
}

/// Writes uploads under a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Maps a stored path (or a legacy `public/...` path) back onto disk.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, AppError> {
        let normalized = stored_path.replace('\\', "/");
        let relative = normalized
            .strip_prefix(PUBLIC_PREFIX)
            .or_else(|| normalized.strip_prefix("public/uploads/"))
            .or_else(|| normalized.strip_prefix("public/"))
            .unwrap_or(&normalized);

        let relative = Path::new(relative);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(AppError::BadRequest("Invalid file path".to_string()));
        }

        Ok(self.root.join(relative))
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .map(slugify)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "upload".to_string());

    match path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .filter(|value| !value.is_empty())
    {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, AppError> {
        let name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(file_name));
        fs::write(self.root.join(&name), bytes).await?;
        tracing::debug!("Stored upload {}", name);
        Ok(format!("{PUBLIC_PREFIX}{name}"))
    }

    async fn delete(&self, stored_path: &str) -> Result<(), AppError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("File already removed: {}", absolute.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Deletes every path, logging failures instead of aborting.
pub async fn delete_all(files: &dyn FileStore, paths: &[String]) {
    for path in paths {
        if let Err(err) = files.delete(path).await {
            tracing::warn!("Failed to delete {}: {}", path, err);
        }
    }
}
