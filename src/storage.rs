use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

/// Durable storage for uploaded file contents.
///
/// `store` returns a reference string that is saved alongside the record and
/// later handed back to `remove`.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;

    async fn remove(&self, reference: &str) -> Result<()>;
}

/// Stores files flat in a directory on local disk. References are bare file
/// names, served back under `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if reference.is_empty()
            || reference.contains(['/', '\\'])
            || reference == "."
            || reference == ".."
        {
            bail!("invalid file reference: {reference:?}");
        }
        Ok(self.root.join(reference))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating upload dir {}", self.root.display()))?;

        let reference = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(suggested_name));
        let path = self.root.join(&reference);
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::debug!(reference = %reference, size = bytes.len(), "stored file");
        Ok(reference)
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let path = self.resolve(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// Keeps only the final path component of a client-supplied name and
/// replaces anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\cat.jpg"), "cat.jpg");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_file_name("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn resolve_rejects_traversal() {
        let storage = LocalFileStorage::new("uploads");
        assert!(storage.resolve("../secret").is_err());
        assert!(storage.resolve("..").is_err());
        assert!(storage.resolve("").is_err());
        assert!(storage.resolve("abc_cat.jpg").is_ok());
    }
}
