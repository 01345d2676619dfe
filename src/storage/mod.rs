// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod http;
pub mod memory;
pub mod object;
pub mod retry;

pub use http::{HttpObjectStorage, HttpStorageConfig};
pub use memory::{FailureKind, MemoryObjectStorage};
pub use object::{BatchOutcome, ObjectStorage, StorageError};
pub use retry::{retry_with_backoff, RetryConfig, RetryingStorage};
