//! Boundary to the object-storage backend.
//!
//! The core never talks to storage directly: it builds a [`RemoteCall`] and
//! hands it to [`dispatch`], which runs it against a [`RemoteStore`] under a
//! timeout.

pub mod local;
pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::tree::node::ListingEntry;

pub use local::LocalDirRemote;
pub use memory::MemoryRemote;

/// Client of the remote listing/create/delete/move/upload API.
///
/// Keys passed in are bucket-relative: any identity prefix is already stripped.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Flat listing of every object in the container.
    async fn fetch_listing(&self, container: &str) -> Result<Vec<ListingEntry>>;

    async fn create_folder(&self, container: &str, parent_key: &str, name: &str) -> Result<()>;

    async fn delete(&self, container: &str, key: &str, is_folder: bool) -> Result<()>;

    async fn move_object(&self, container: &str, source_key: &str, dest_key: &str) -> Result<()>;

    /// Store `body` as `name` under `parent_key`; returns the new object's key.
    async fn upload(
        &self,
        container: &str,
        parent_key: &str,
        name: &str,
        body: Vec<u8>,
    ) -> Result<String>;
}

/// A remote request resolved from a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateFolder { parent_key: String, name: String },
    Delete { key: String, is_folder: bool },
    Move { source_key: String, dest_key: String },
    Upload { parent_key: String, name: String, body: Vec<u8> },
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCall::CreateFolder { parent_key, name } => {
                write!(f, "create folder {}{}/", parent_key, name)
            }
            RemoteCall::Delete { key, .. } => write!(f, "delete {}", key),
            RemoteCall::Move {
                source_key,
                dest_key,
            } => write!(f, "move {} -> {}", source_key, dest_key),
            RemoteCall::Upload {
                parent_key,
                name,
                body,
            } => write!(f, "upload {}{} ({} bytes)", parent_key, name, body.len()),
        }
    }
}

/// Successful outcome of a [`RemoteCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAck {
    Done,
    Uploaded { key: String },
}

/// Run `call` against `remote`, failing with [`AppError::Timeout`] when it
/// does not settle within `timeout`.
pub async fn dispatch(
    remote: Arc<dyn RemoteStore>,
    container: String,
    call: RemoteCall,
    timeout: Duration,
) -> Result<RemoteAck> {
    debug!(%call, container = %container, "dispatching remote call");
    let work = async {
        match call {
            RemoteCall::CreateFolder { parent_key, name } => remote
                .create_folder(&container, &parent_key, &name)
                .await
                .map(|_| RemoteAck::Done),
            RemoteCall::Delete { key, is_folder } => remote
                .delete(&container, &key, is_folder)
                .await
                .map(|_| RemoteAck::Done),
            RemoteCall::Move {
                source_key,
                dest_key,
            } => remote
                .move_object(&container, &source_key, &dest_key)
                .await
                .map(|_| RemoteAck::Done),
            RemoteCall::Upload {
                parent_key,
                name,
                body,
            } => remote
                .upload(&container, &parent_key, &name, body)
                .await
                .map(|key| RemoteAck::Uploaded { key }),
        }
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(timeout)),
    }
}
