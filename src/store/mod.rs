// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod facade;

pub use config::StoreConfig;
pub use facade::{build_backend, Document, Embedder, VectorStore};
