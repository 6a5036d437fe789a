// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the allocator resources.

/// Errors that can occur while allocating from a memory resource.
///
/// Deallocation never fails, so there is no deallocation counterpart.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// No block large enough was available even after growth, or the
    /// request itself is unsatisfiable: zero bytes, zero alignment, or
    /// larger than a single region payload.
    #[error("out of memory: requested {requested} bytes aligned to {alignment}")]
    OutOfMemory {
        /// The number of bytes requested.
        requested: usize,
        /// The alignment requested.
        alignment: usize,
    },

    /// The operating system refused to map a new region.
    #[error("region acquisition failed: {0}")]
    Region(#[from] virtual_memory::RegionError),
}
