//! Local Store
//!
//! In-memory key -> value map backed by a per-node snapshot file.
//! Every mutation rewrites the whole file; there is no log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Full store contents
pub type Snapshot = BTreeMap<String, String>;

/// Parse a serialized snapshot (flat JSON object of strings)
pub fn parse_snapshot(data: &str) -> Result<Snapshot> {
    Ok(serde_json::from_str(data)?)
}

/// Serialize a snapshot compactly (used on the wire)
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Persistent local store
///
/// All reads and writes go through one mutex, which also covers the file
/// rewrite, so concurrent writers can neither lose updates nor interleave
/// file contents.
pub struct LocalStore {
    /// Snapshot file path
    path: PathBuf,
    /// Store contents
    map: Mutex<Snapshot>,
}

impl LocalStore {
    /// Snapshot file name for a node
    pub fn snapshot_path(data_dir: &Path, node_id: &str) -> PathBuf {
        data_dir.join(format!("data_{}.json", node_id))
    }

    /// Open the store, seeding it from the snapshot file if present
    ///
    /// A corrupt file is logged and ignored; the store starts empty.
    pub fn open(path: PathBuf) -> Result<Self> {
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => match parse_snapshot(&content) {
                Ok(map) => {
                    tracing::info!("Loaded {} keys from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    tracing::error!(
                        "Snapshot file {} is corrupt ({}), starting with an empty store",
                        path.display(),
                        e
                    );
                    Snapshot::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting with an empty store", path.display());
                Snapshot::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a key
    pub async fn get(&self, key: &str) -> Option<String> {
        self.map.lock().await.get(key).cloned()
    }

    /// Write a key and persist
    ///
    /// If persisting fails the previous value is restored.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().await;
        let previous = map.insert(key.to_string(), value.to_string());

        if let Err(e) = write_snapshot_file(&self.path, &map).await {
            match previous {
                Some(old) => map.insert(key.to_string(), old),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Delete a key and persist; returns whether it existed
    ///
    /// Deleting a missing key does not touch the file.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut map = self.map.lock().await;
        let Some(previous) = map.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = write_snapshot_file(&self.path, &map).await {
            map.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Replace the whole store and persist
    pub async fn replace(&self, snapshot: Snapshot) -> Result<()> {
        let mut map = self.map.lock().await;
        write_snapshot_file(&self.path, &snapshot).await?;
        *map = snapshot;
        Ok(())
    }

    /// Serialize the store from one consistent read
    pub async fn snapshot_json(&self) -> Result<String> {
        let map = self.map.lock().await;
        encode_snapshot(&map)
    }

    /// Copy of the store contents
    pub async fn snapshot(&self) -> Snapshot {
        self.map.lock().await.clone()
    }

    /// Rewrite the snapshot file from memory
    pub async fn persist(&self) -> Result<()> {
        let map = self.map.lock().await;
        write_snapshot_file(&self.path, &map).await
    }

    /// Number of keys
    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.map.lock().await.is_empty()
    }
}

/// Write the full snapshot to a temp file, then rename it over the target
async fn write_snapshot_file(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let body = serde_json::to_string_pretty(snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, body.as_bytes())
        .await
        .map_err(|e| Error::Internal(format!("writing {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Internal(format!("replacing {}: {}", path.display(), e)))?;

    tracing::trace!("Persisted {} keys to {}", snapshot.len(), path.display());
    Ok(())
}
