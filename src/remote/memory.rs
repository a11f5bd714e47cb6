use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::remote::RemoteStore;
use crate::tree::key;
use crate::tree::node::ListingEntry;

/// Which remote operation a failure is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Listing,
    CreateFolder,
    Delete,
    Move,
    Upload,
}

/// In-memory object store.
///
/// Objects are kept per container, keyed by bucket-relative key. Listings
/// report keys with the configured identity prefix in front, like a real
/// bucket shared between tenants would.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    containers: Mutex<HashMap<String, BTreeMap<String, ListingEntry>>>,
    failing: Mutex<HashSet<RemoteOp>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    prefix: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose listings carry `prefix` in front of every key.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: key::normalize_prefix(prefix),
            ..Self::default()
        }
    }

    /// Seed a container with entries (keys are bucket-relative).
    pub fn seed(&self, container: &str, entries: impl IntoIterator<Item = ListingEntry>) {
        let mut containers = lock(&self.containers);
        let objects = containers.entry(container.to_string()).or_default();
        for entry in entries {
            objects.insert(entry.key.clone(), entry);
        }
    }

    /// Make every subsequent call of `op` fail until [`Self::heal`] is called.
    pub fn fail(&self, op: RemoteOp) {
        lock(&self.failing).insert(op);
    }

    pub fn heal(&self, op: RemoteOp) {
        lock(&self.failing).remove(&op);
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Human-readable log of calls received, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Bucket-relative keys currently stored in `container`.
    pub fn keys(&self, container: &str) -> Vec<String> {
        lock(&self.containers)
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn enter(&self, op: RemoteOp, description: String) -> Result<()> {
        lock(&self.calls).push(description.clone());
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.failing).contains(&op) {
            return Err(AppError::RemoteRejected(format!("{} refused", description)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_listing(&self, container: &str) -> Result<Vec<ListingEntry>> {
        self.enter(RemoteOp::Listing, format!("list {}", container))
            .await?;
        let containers = lock(&self.containers);
        let entries = containers
            .get(container)
            .map(|objects| {
                objects
                    .values()
                    .map(|entry| ListingEntry {
                        key: format!("{}{}", self.prefix, entry.key),
                        ..entry.clone()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn create_folder(&self, container: &str, parent_key: &str, name: &str) -> Result<()> {
        let folder_key = key::child_key(parent_key, name, true);
        self.enter(RemoteOp::CreateFolder, format!("mkdir {}", folder_key))
            .await?;
        let mut containers = lock(&self.containers);
        let objects = containers.entry(container.to_string()).or_default();
        if objects.contains_key(&folder_key) {
            return Err(AppError::RemoteRejected(format!(
                "{} already exists",
                folder_key
            )));
        }
        objects.insert(folder_key.clone(), ListingEntry::new(folder_key));
        Ok(())
    }

    async fn delete(&self, container: &str, target: &str, is_folder: bool) -> Result<()> {
        self.enter(RemoteOp::Delete, format!("rm {}", target)).await?;
        let mut containers = lock(&self.containers);
        let objects = containers.entry(container.to_string()).or_default();
        let doomed: Vec<String> = if is_folder {
            objects
                .keys()
                .filter(|k| k.starts_with(target))
                .cloned()
                .collect()
        } else {
            objects.keys().filter(|k| *k == target).cloned().collect()
        };
        if doomed.is_empty() {
            return Err(AppError::RemoteRejected(format!("{} does not exist", target)));
        }
        for k in doomed {
            objects.remove(&k);
        }
        Ok(())
    }

    async fn move_object(&self, container: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.enter(RemoteOp::Move, format!("mv {} {}", source_key, dest_key))
            .await?;
        let mut containers = lock(&self.containers);
        let objects = containers.entry(container.to_string()).or_default();
        let taken = objects
            .keys()
            .any(|k| k == dest_key || (dest_key.ends_with('/') && k.starts_with(dest_key)));
        if taken {
            return Err(AppError::RemoteRejected(format!("{} already exists", dest_key)));
        }
        let moving: Vec<String> = objects
            .keys()
            .filter(|k| *k == source_key || (source_key.ends_with('/') && k.starts_with(source_key)))
            .cloned()
            .collect();
        if moving.is_empty() {
            return Err(AppError::RemoteRejected(format!(
                "{} does not exist",
                source_key
            )));
        }
        for old in moving {
            if let Some(mut entry) = objects.remove(&old) {
                entry.key = format!("{}{}", dest_key, &old[source_key.len()..]);
                objects.insert(entry.key.clone(), entry);
            }
        }
        Ok(())
    }

    async fn upload(
        &self,
        container: &str,
        parent_key: &str,
        name: &str,
        body: Vec<u8>,
    ) -> Result<String> {
        let file_key = key::child_key(parent_key, name, false);
        self.enter(RemoteOp::Upload, format!("put {}", file_key))
            .await?;
        let mut containers = lock(&self.containers);
        let objects = containers.entry(container.to_string()).or_default();
        let mut entry = ListingEntry::file(file_key.clone(), body.len() as u64);
        entry.last_modified = Some(Utc::now());
        objects.insert(file_key.clone(), entry);
        Ok(file_key)
    }
}
