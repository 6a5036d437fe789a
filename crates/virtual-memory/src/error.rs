// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for region acquisition.

/// Errors that can occur while acquiring virtual memory from the OS.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The OS refused to map a region, even after retrying with
    /// progressively smaller sizes.
    #[error("virtual memory exhausted: could not map {requested} bytes (smallest attempt {smallest})")]
    Exhausted {
        /// The size originally requested.
        requested: usize,
        /// The smallest size attempted before giving up.
        smallest: usize,
    },

    /// Region acquisition is not implemented for this platform.
    #[error("virtual-memory acquisition is not supported on this platform")]
    UnsupportedPlatform,
}
