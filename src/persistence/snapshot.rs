// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::StoreError;
use crate::core::types::{DistanceMetric, Record, RecordId};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Self-describing serialization of a store's full state.
///
/// `checksum` is the blake3 digest (hex) of the CBOR encoding of every other
/// field, so a snapshot can be verified without trusting its container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
    pub records: Vec<Record>,
    #[serde(default)]
    pub retired_ids: Vec<RecordId>,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
}

#[derive(Serialize)]
struct ChecksumView<'a> {
    format_version: u32,
    dimension: Option<usize>,
    metric: DistanceMetric,
    records: &'a [Record],
    retired_ids: &'a [RecordId],
    created_at: &'a DateTime<Utc>,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl Snapshot {
    pub fn new(
        dimension: Option<usize>,
        metric: DistanceMetric,
        records: Vec<Record>,
        retired_ids: Vec<RecordId>,
    ) -> Result<Self, StoreError> {
        let mut snapshot = Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension,
            metric,
            records,
            retired_ids,
            created_at: Utc::now(),
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.compute_checksum()?;
        Ok(snapshot)
    }

    pub fn compute_checksum(&self) -> Result<String, StoreError> {
        let view = ChecksumView {
            format_version: self.format_version,
            dimension: self.dimension,
            metric: self.metric,
            records: &self.records,
            retired_ids: &self.retired_ids,
            created_at: &self.created_at,
        };
        let bytes =
            serde_cbor::to_vec(&view).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    pub fn verify(&self) -> Result<(), StoreError> {
        let actual = self.compute_checksum()?;
        if actual != self.checksum {
            return Err(StoreError::CorruptState(format!(
                "snapshot checksum mismatch: recorded {}, computed {}",
                self.checksum, actual
            )));
        }
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        serde_cbor::to_vec(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    /// Decodes and verifies. Unknown versions are rejected before the body
    /// is interpreted; undecodable or mismatching payloads are `CorruptState`.
    pub fn from_cbor(data: &[u8]) -> Result<Self, StoreError> {
        let probe: VersionProbe = serde_cbor::from_slice(data)
            .map_err(|e| StoreError::CorruptState(format!("unreadable snapshot: {}", e)))?;
        if probe.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::UnsupportedSnapshotVersion {
                found: probe.format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }

        let snapshot: Snapshot = serde_cbor::from_slice(data)
            .map_err(|e| StoreError::CorruptState(format!("unreadable snapshot: {}", e)))?;
        snapshot.verify()?;
        Ok(snapshot)
    }
}

/// Describes a committed snapshot. Written next to the snapshot locally and
/// used as the pointer object remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub generation: u64,
    pub location: String,
    pub checksum: String,
    pub record_count: usize,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
    pub committed_at: DateTime<Utc>,
}

impl SnapshotManifest {
    pub fn describe(snapshot: &Snapshot, generation: u64, location: String) -> Self {
        Self {
            format_version: snapshot.format_version,
            generation,
            location,
            checksum: snapshot.checksum.clone(),
            record_count: snapshot.record_count(),
            dimension: snapshot.dimension,
            metric: snapshot.metric,
            committed_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(data)
            .map_err(|e| StoreError::CorruptState(format!("unreadable snapshot manifest: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Metadata, MetadataValue};

    fn sample() -> Snapshot {
        let now = Utc::now();
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("unit"));
        metadata.insert("page".into(), MetadataValue::from(7i64));
        Snapshot::new(
            Some(2),
            DistanceMetric::Cosine,
            vec![Record {
                id: RecordId::from("a"),
                content: "alpha".into(),
                metadata,
                vector: vec![1.0, 0.5],
                created_at: now,
                updated_at: now,
            }],
            vec![RecordId::from("gone")],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_decode_verifies() {
        let snapshot = sample();
        let decoded = Snapshot::from_cbor(&snapshot.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_tampered_content_is_corrupt() {
        let mut snapshot = sample();
        snapshot.records[0].content = "tampered".into();
        let bytes = snapshot.to_cbor().unwrap();

        assert!(matches!(
            Snapshot::from_cbor(&bytes),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        snapshot.checksum = snapshot.compute_checksum().unwrap();

        assert!(matches!(
            Snapshot::from_cbor(&snapshot.to_cbor().unwrap()),
            Err(StoreError::UnsupportedSnapshotVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            Snapshot::from_cbor(b"definitely not cbor"),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn test_manifest_json_round_trip() {
        let snapshot = sample();
        let manifest = SnapshotManifest::describe(&snapshot, 4, "snapshot.cbor".into());
        let decoded = SnapshotManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.record_count, 1);
    }
}
