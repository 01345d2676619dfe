// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Exact nearest-neighbour index.
//!
//! Every query scans all live vectors, so results are exact and their order
//! is fully determined by score and id.

use std::collections::BTreeMap;

use crate::core::error::StoreError;
use crate::core::types::{DistanceMetric, RecordId};
use crate::core::vector_ops;

#[derive(Debug, Clone)]
struct IndexEntry {
    vector: Vec<f32>,
    norm: f32,
}

impl IndexEntry {
    fn new(vector: Vec<f32>) -> Self {
        let norm = vector_ops::magnitude(&vector);
        Self { vector, norm }
    }
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dimension: Option<usize>,
    entries: BTreeMap<RecordId, IndexEntry>,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            dimension: None,
            entries: BTreeMap::new(),
        }
    }

    /// Empty index whose dimension is already established, e.g. restored
    /// from a snapshot whose records were all removed.
    pub fn with_dimension(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            metric,
            dimension: Some(dimension),
            entries: BTreeMap::new(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Fixed by the first successful insert; `None` until then.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn vector(&self, id: &RecordId) -> Option<&[f32]> {
        self.entries.get(id).map(|e| e.vector.as_slice())
    }

    pub fn check_dimension(&self, actual: usize) -> Result<(), StoreError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(StoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, id: RecordId, vector: Vec<f32>) -> Result<(), StoreError> {
        if vector.is_empty() {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension.unwrap_or(1),
                actual: 0,
            });
        }
        self.check_dimension(vector.len())?;
        if self.entries.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        self.dimension.get_or_insert(vector.len());
        self.entries.insert(id, IndexEntry::new(vector));
        Ok(())
    }

    pub fn replace(&mut self, id: &RecordId, vector: Vec<f32>) -> Result<(), StoreError> {
        self.check_dimension(vector.len())?;
        match self.entries.get_mut(id) {
            Some(entry) => {
                *entry = IndexEntry::new(vector);
                Ok(())
            }
            None => Err(StoreError::record_not_found(id)),
        }
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<Vec<f32>> {
        self.entries.remove(id).map(|e| e.vector)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(RecordId, f32)>, StoreError> {
        self.check_dimension(query.len())?;
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = vector_ops::magnitude(query);
        let scored = self
            .entries
            .iter()
            .map(|(id, entry)| {
                let score = match self.metric {
                    DistanceMetric::Cosine => {
                        vector_ops::cosine_with_norms(query, query_norm, &entry.vector, entry.norm)
                    }
                    DistanceMetric::Euclidean => {
                        vector_ops::negative_squared_euclidean(query, &entry.vector)
                    }
                };
                (id.clone(), score)
            })
            .collect();

        Ok(vector_ops::top_k(scored, k))
    }
}
