// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod api;
pub mod queue;

pub use api::{ApiError, ApiResult, TaskApi};
pub use queue::OfflineQueue;
