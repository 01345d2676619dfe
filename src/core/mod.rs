// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod error;
pub mod index;
pub mod state;
pub mod types;
pub mod vector_ops;

pub use error::StoreError;
pub use index::FlatIndex;
pub use state::StoreState;
pub use types::{
    DistanceMetric, Metadata, MetadataValue, NewRecord, Record, RecordId, RecordUpdate, SearchHit,
};
