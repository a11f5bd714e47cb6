use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::remote::RemoteStore;
use crate::tree::key;
use crate::tree::node::ListingEntry;

/// Container store backed by a local directory.
///
/// Each container is a subdirectory of `root`. Object keys map to relative
/// paths inside it and folder markers are directories.
#[derive(Debug, Clone)]
pub struct LocalDirRemote {
    root: PathBuf,
}

impl LocalDirRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf> {
        if !key::is_valid_name(container) {
            return Err(AppError::InvalidPath(container.to_string()));
        }
        Ok(self.root.join(container))
    }

    /// Map a key onto a path inside the container, refusing `..` and friends.
    fn resolve(&self, container: &str, object_key: &str) -> Result<PathBuf> {
        let mut path = self.container_dir(container)?;
        let (segments, _) = key::split(object_key);
        for segment in segments {
            if !key::is_valid_name(segment) {
                return Err(AppError::InvalidPath(object_key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

fn rejected(what: &str, err: std::io::Error) -> AppError {
    AppError::RemoteRejected(format!("{}: {}", what, err))
}

#[async_trait]
impl RemoteStore for LocalDirRemote {
    async fn fetch_listing(&self, container: &str) -> Result<Vec<ListingEntry>> {
        let base = self.container_dir(container)?;
        let mut entries = Vec::new();
        let mut stack = vec![(base, String::new())];

        while let Some((dir, prefix)) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

                if metadata.is_dir() {
                    let folder_key = key::child_key(&prefix, &name, true);
                    let mut listing = ListingEntry::new(folder_key.clone());
                    listing.last_modified = modified;
                    entries.push(listing);
                    stack.push((entry.path(), folder_key));
                } else if metadata.is_file() {
                    let mut listing =
                        ListingEntry::file(key::child_key(&prefix, &name, false), metadata.len());
                    listing.last_modified = modified;
                    entries.push(listing);
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(container, entries = entries.len(), "listed local container");
        Ok(entries)
    }

    async fn create_folder(&self, container: &str, parent_key: &str, name: &str) -> Result<()> {
        if !key::is_valid_name(name) {
            return Err(AppError::InvalidPath(name.to_string()));
        }
        let path = self.resolve(container, parent_key)?.join(name);
        fs::create_dir(&path)
            .await
            .map_err(|e| rejected(&key::child_key(parent_key, name, true), e))
    }

    async fn delete(&self, container: &str, object_key: &str, is_folder: bool) -> Result<()> {
        let path = self.resolve(container, object_key)?;
        if path == self.container_dir(container)? {
            return Err(AppError::InvalidPath("refusing to delete the container".into()));
        }
        let result = if is_folder {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| rejected(object_key, e))
    }

    async fn move_object(&self, container: &str, source_key: &str, dest_key: &str) -> Result<()> {
        let from = self.resolve(container, source_key)?;
        let to = self.resolve(container, dest_key)?;
        if fs::try_exists(&to).await? {
            return Err(AppError::RemoteRejected(format!("{} already exists", dest_key)));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from, &to)
            .await
            .map_err(|e| rejected(source_key, e))
    }

    async fn upload(
        &self,
        container: &str,
        parent_key: &str,
        name: &str,
        body: Vec<u8>,
    ) -> Result<String> {
        if !key::is_valid_name(name) {
            return Err(AppError::InvalidPath(name.to_string()));
        }
        let dir = self.resolve(container, parent_key)?;
        fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        if fs::try_exists(&path).await? {
            return Err(AppError::RemoteRejected(format!("{} already exists", name)));
        }
        fs::write(&path, body).await?;
        Ok(key::child_key(parent_key, name, false))
    }
}
