// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-memory store state shared by every backend: the vector index, the
//! record metadata map, the dirty flag and the set of retired ids.
//!
//! Mutations are split into a `prepare_*` step that validates against `&self`
//! and an `apply_*` step that cannot fail on prepared input. Backends that
//! talk to a remote store run the remote write between the two.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::error::StoreError;
use crate::core::index::FlatIndex;
use crate::core::types::{
    DistanceMetric, Metadata, NewRecord, Record, RecordId, RecordUpdate, SearchHit,
};
use crate::persistence::snapshot::Snapshot;

#[derive(Debug, Clone)]
struct StoredRecord {
    content: String,
    metadata: Metadata,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoreState {
    index: FlatIndex,
    records: HashMap<RecordId, StoredRecord>,
    retired: BTreeSet<RecordId>,
    dirty: bool,
    mutations: u64,
}

impl StoreState {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            index: FlatIndex::new(metric),
            records: HashMap::new(),
            retired: BTreeSet::new(),
            dirty: false,
            mutations: 0,
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.index.metric()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Monotonic counter of applied mutations, used to detect writes that
    /// landed while a snapshot was being written.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.mutations += 1;
    }

    /// Assigns ids and timestamps and validates the whole batch; nothing is
    /// applied if any record is rejected.
    pub fn prepare_add(&self, records: Vec<NewRecord>) -> Result<Vec<Record>, StoreError> {
        let mut expected = self.dimension();
        let mut seen = HashSet::with_capacity(records.len());
        let now = Utc::now();

        let mut prepared = Vec::with_capacity(records.len());
        for new in records {
            let actual = new.vector.len();
            match expected {
                Some(dim) if dim != actual => {
                    return Err(StoreError::DimensionMismatch {
                        expected: dim,
                        actual,
                    })
                }
                _ if actual == 0 => {
                    return Err(StoreError::DimensionMismatch {
                        expected: expected.unwrap_or(1),
                        actual,
                    })
                }
                _ => expected = Some(actual),
            }

            let id = new.id.unwrap_or_default();
            if self.records.contains_key(&id) || self.retired.contains(&id) || !seen.insert(id.clone())
            {
                return Err(StoreError::DuplicateId(id));
            }

            prepared.push(Record {
                id,
                content: new.content,
                metadata: new.metadata,
                vector: new.vector,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(prepared)
    }

    pub fn apply_add(&mut self, records: Vec<Record>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            if self.retired.contains(&record.id) {
                return Err(StoreError::DuplicateId(record.id));
            }
            self.index.insert(record.id.clone(), record.vector)?;
            self.records.insert(
                record.id,
                StoredRecord {
                    content: record.content,
                    metadata: record.metadata,
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                },
            );
        }
        self.touch();
        Ok(())
    }

    /// Builds the replacement record. `created_at` is preserved and
    /// `updated_at` never moves backwards.
    pub fn prepare_update(&self, id: &RecordId, update: RecordUpdate) -> Result<Record, StoreError> {
        let mut record = self.get(id)?;
        if let Some(vector) = update.vector {
            self.index.check_dimension(vector.len())?;
            record.vector = vector;
        }
        if let Some(content) = update.content {
            record.content = content;
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        record.updated_at = Utc::now().max(record.updated_at);
        Ok(record)
    }

    pub fn apply_update(&mut self, record: Record) -> Result<(), StoreError> {
        let stored = self
            .records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::record_not_found(&record.id))?;
        self.index.replace(&record.id, record.vector)?;
        stored.content = record.content;
        stored.metadata = record.metadata;
        stored.updated_at = record.updated_at;
        self.touch();
        Ok(())
    }

    /// Deduplicated subset of `ids` that currently exist.
    pub fn live_ids(&self, ids: &[RecordId]) -> Vec<RecordId> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| self.records.contains_key(*id) && seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Returns whether anything was removed. Absent ids are ignored.
    pub fn apply_remove(&mut self, ids: &[RecordId]) -> bool {
        let mut removed = false;
        for id in ids {
            if self.records.remove(id).is_some() {
                self.index.remove(id);
                self.retired.insert(id.clone());
                removed = true;
            }
        }
        if removed {
            self.touch();
        }
        removed
    }

    pub fn get(&self, id: &RecordId) -> Result<Record, StoreError> {
        let stored = self
            .records
            .get(id)
            .ok_or_else(|| StoreError::record_not_found(id))?;
        let vector = self
            .index
            .vector(id)
            .ok_or_else(|| StoreError::CorruptState(format!("record {} has no vector", id)))?;
        Ok(Record {
            id: id.clone(),
            content: stored.content.clone(),
            metadata: stored.metadata.clone(),
            vector: vector.to_vec(),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|(id, score)| {
                Ok(SearchHit {
                    record: self.get(&id)?,
                    score,
                })
            })
            .collect()
    }

    /// Point-in-time copy of every live record, ordered by id.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut ids: Vec<&RecordId> = self.records.keys().collect();
        ids.sort();
        let records = ids
            .into_iter()
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>, _>>()?;

        Snapshot::new(
            self.dimension(),
            self.metric(),
            records,
            self.retired.iter().cloned().collect(),
        )
    }

    /// Rebuilds state by replaying every record through the insertion path.
    /// The result is clean.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        let mut state = StoreState::new(snapshot.metric);
        state.retired = snapshot.retired_ids.into_iter().collect();

        for record in snapshot.records {
            if let Some(dim) = snapshot.dimension {
                if record.vector.len() != dim {
                    return Err(StoreError::CorruptState(format!(
                        "record {} has dimension {}, snapshot declares {}",
                        record.id,
                        record.vector.len(),
                        dim
                    )));
                }
            }
            let id = record.id.clone();
            state.apply_add(vec![record]).map_err(|e| {
                StoreError::CorruptState(format!("cannot replay record {}: {}", id, e))
            })?;
        }

        if state.dimension().is_none() {
            if let Some(dim) = snapshot.dimension {
                state.index = FlatIndex::with_dimension(snapshot.metric, dim);
            }
        }

        state.dirty = false;
        Ok(state)
    }

    pub fn mark_dirty(&mut self) {
        self.touch();
    }

    /// Clears the dirty flag unless something changed after `mutations` was
    /// observed.
    pub fn mark_persisted(&mut self, mutations: u64) {
        if self.mutations == mutations {
            self.dirty = false;
        }
    }
}
