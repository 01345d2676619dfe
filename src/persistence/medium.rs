// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Where snapshots live and how a staged snapshot becomes the committed one.
//!
//! Both media keep the previously committed generation until a new one has
//! been committed, so an interrupted persist never leaves storage without a
//! loadable snapshot.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::error::StoreError;
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};
use crate::storage::object::ObjectStorage;

pub const SNAPSHOT_FILE: &str = "snapshot.cbor";
pub const STAGED_SNAPSHOT_FILE: &str = "snapshot.cbor.tmp";
pub const PREVIOUS_SNAPSHOT_FILE: &str = "snapshot.prev.cbor";
pub const MANIFEST_FILE: &str = "snapshot.json";
pub const PREVIOUS_MANIFEST_FILE: &str = "snapshot.prev.json";
pub const STAGED_MANIFEST_FILE: &str = "snapshot.json.tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSlot {
    Current,
    Previous,
}

/// A snapshot written under its temporary name, not yet visible to `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSnapshot {
    pub generation: u64,
    pub location: String,
}

#[async_trait]
pub trait SnapshotMedium: Send + Sync {
    async fn stage(&self, generation: u64, bytes: Vec<u8>) -> Result<StagedSnapshot, StoreError>;

    async fn read_staged(&self, staged: &StagedSnapshot) -> Result<Vec<u8>, StoreError>;

    /// Makes `staged` the current snapshot, demoting the old current one to
    /// previous.
    async fn commit(
        &self,
        staged: &StagedSnapshot,
        manifest: &SnapshotManifest,
    ) -> Result<(), StoreError>;

    async fn read(&self, slot: SnapshotSlot) -> Result<Option<Vec<u8>>, StoreError>;

    async fn manifest(&self, slot: SnapshotSlot) -> Result<Option<SnapshotManifest>, StoreError>;

    fn describe(&self) -> String;
}

// ============================================================================
// Local files
// ============================================================================

/// Snapshot files in a directory. Commit is a rename over the current file.
#[derive(Debug, Clone)]
pub struct FileSnapshotMedium {
    dir: PathBuf,
}

impl FileSnapshotMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Writes `bytes` to `file` via a temporary file and rename, so `file`
    /// is never half-written.
    async fn replace_file(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.path(&format!("{}.tmp", file));
        Self::write_synced(&tmp, bytes).await?;
        fs::rename(&tmp, self.path(file)).await?;
        Ok(())
    }

    /// The staged manifest, if a commit renamed the snapshot it describes
    /// into place but stopped before renaming the manifest.
    async fn rolled_forward_manifest(&self) -> Result<Option<SnapshotManifest>, StoreError> {
        let Some(bytes) = Self::read_optional(&self.path(STAGED_MANIFEST_FILE)).await? else {
            return Ok(None);
        };
        let Ok(staged) = SnapshotManifest::from_json(&bytes) else {
            return Ok(None);
        };
        let Some(snapshot) = Self::read_optional(&self.path(SNAPSHOT_FILE)).await? else {
            return Ok(None);
        };
        match Snapshot::from_cbor(&snapshot) {
            Ok(snapshot) if snapshot.checksum == staged.checksum => Ok(Some(staged)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotMedium for FileSnapshotMedium {
    async fn stage(&self, generation: u64, bytes: Vec<u8>) -> Result<StagedSnapshot, StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path(STAGED_SNAPSHOT_FILE);
        Self::write_synced(&path, &bytes).await?;
        Ok(StagedSnapshot {
            generation,
            location: path.display().to_string(),
        })
    }

    async fn read_staged(&self, staged: &StagedSnapshot) -> Result<Vec<u8>, StoreError> {
        Ok(fs::read(&staged.location).await?)
    }

    async fn commit(
        &self,
        staged: &StagedSnapshot,
        manifest: &SnapshotManifest,
    ) -> Result<(), StoreError> {
        let current = self.manifest(SnapshotSlot::Current).await?;
        if let Some(bytes) = Self::read_optional(&self.path(SNAPSHOT_FILE)).await? {
            self.replace_file(PREVIOUS_SNAPSHOT_FILE, &bytes).await?;
        }
        if let Some(current) = current {
            self.replace_file(PREVIOUS_MANIFEST_FILE, &current.to_json()?)
                .await?;
        }

        // Both files are in place before the first rename, so the window
        // between snapshot and manifest is two back-to-back renames.
        let manifest_tmp = self.path(STAGED_MANIFEST_FILE);
        Self::write_synced(&manifest_tmp, &manifest.to_json()?).await?;
        fs::rename(&staged.location, self.path(SNAPSHOT_FILE)).await?;
        fs::rename(&manifest_tmp, self.path(MANIFEST_FILE)).await?;

        debug!(
            "Committed snapshot generation {} in {}",
            staged.generation,
            self.dir.display()
        );
        Ok(())
    }

    async fn read(&self, slot: SnapshotSlot) -> Result<Option<Vec<u8>>, StoreError> {
        let file = match slot {
            SnapshotSlot::Current => SNAPSHOT_FILE,
            SnapshotSlot::Previous => PREVIOUS_SNAPSHOT_FILE,
        };
        Self::read_optional(&self.path(file)).await
    }

    async fn manifest(&self, slot: SnapshotSlot) -> Result<Option<SnapshotManifest>, StoreError> {
        let file = match slot {
            SnapshotSlot::Current => {
                if let Some(staged) = self.rolled_forward_manifest().await? {
                    return Ok(Some(staged));
                }
                MANIFEST_FILE
            }
            SnapshotSlot::Previous => PREVIOUS_MANIFEST_FILE,
        };
        Self::read_optional(&self.path(file))
            .await?
            .map(|bytes| SnapshotManifest::from_json(&bytes))
            .transpose()
    }

    fn describe(&self) -> String {
        format!("file://{}", self.dir.display())
    }
}

// ============================================================================
// Remote objects
// ============================================================================

/// Snapshot objects under `{prefix}/snapshot/`. Each generation is written to
/// its own key; commit repoints the `CURRENT` pointer object after copying
/// the old pointer to `PREVIOUS`.
#[derive(Clone)]
pub struct ObjectSnapshotMedium {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl ObjectSnapshotMedium {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn current_pointer_key(&self) -> String {
        format!("{}/snapshot/CURRENT", self.prefix)
    }

    pub fn previous_pointer_key(&self) -> String {
        format!("{}/snapshot/PREVIOUS", self.prefix)
    }

    pub fn generation_key(&self, generation: u64) -> String {
        format!("{}/snapshot/gen-{:020}.cbor", self.prefix, generation)
    }

    fn pointer_key(&self, slot: SnapshotSlot) -> String {
        match slot {
            SnapshotSlot::Current => self.current_pointer_key(),
            SnapshotSlot::Previous => self.previous_pointer_key(),
        }
    }
}

#[async_trait]
impl SnapshotMedium for ObjectSnapshotMedium {
    async fn stage(&self, generation: u64, bytes: Vec<u8>) -> Result<StagedSnapshot, StoreError> {
        let key = self.generation_key(generation);
        self.storage.put(&key, bytes).await?;
        Ok(StagedSnapshot {
            generation,
            location: key,
        })
    }

    async fn read_staged(&self, staged: &StagedSnapshot) -> Result<Vec<u8>, StoreError> {
        self.storage.get(&staged.location).await?.ok_or_else(|| {
            StoreError::CorruptState(format!("staged snapshot {} vanished", staged.location))
        })
    }

    async fn commit(
        &self,
        staged: &StagedSnapshot,
        manifest: &SnapshotManifest,
    ) -> Result<(), StoreError> {
        let stale = self.manifest(SnapshotSlot::Previous).await?;

        let demoted = match self.storage.get(&self.current_pointer_key()).await? {
            Some(bytes) => {
                let current = SnapshotManifest::from_json(&bytes)?;
                self.storage.put(&self.previous_pointer_key(), bytes).await?;
                Some(current)
            }
            None => None,
        };
        self.storage
            .put(&self.current_pointer_key(), manifest.to_json()?)
            .await?;

        debug!(
            "Repointed {} to generation {}",
            self.current_pointer_key(),
            staged.generation
        );

        // The old previous generation is unreachable unless an interrupted
        // commit left both pointers naming the generation just demoted.
        if let Some(stale) = stale {
            let still_referenced = stale.location == staged.location
                || demoted.as_ref().map(|d| &d.location) == Some(&stale.location);
            if !still_referenced {
                if let Err(e) = self.storage.delete(&stale.location).await {
                    warn!("Failed to delete stale snapshot {}: {}", stale.location, e);
                }
            }
        }
        Ok(())
    }

    async fn read(&self, slot: SnapshotSlot) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(manifest) = self.manifest(slot).await? else {
            return Ok(None);
        };
        match self.storage.get(&manifest.location).await? {
            Some(bytes) => Ok(Some(bytes)),
            None => Err(StoreError::CorruptState(format!(
                "{} points at missing object {}",
                self.pointer_key(slot),
                manifest.location
            ))),
        }
    }

    async fn manifest(&self, slot: SnapshotSlot) -> Result<Option<SnapshotManifest>, StoreError> {
        self.storage
            .get(&self.pointer_key(slot))
            .await?
            .map(|bytes| SnapshotManifest::from_json(&bytes))
            .transpose()
    }

    fn describe(&self) -> String {
        format!("object://{}/snapshot", self.prefix)
    }
}
