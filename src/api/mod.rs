// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod rest;

pub use rest::{create_app, ApiConfig, AppState, ErrorResponse};
