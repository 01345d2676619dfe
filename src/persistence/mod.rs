// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod coordinator;
pub mod medium;
pub mod snapshot;

pub use coordinator::{restore_state, SnapshotCoordinator};
pub use medium::{FileSnapshotMedium, ObjectSnapshotMedium, SnapshotMedium, SnapshotSlot, StagedSnapshot};
pub use snapshot::{Snapshot, SnapshotManifest, SNAPSHOT_FORMAT_VERSION};
