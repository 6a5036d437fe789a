// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The scratch resource: a bump buffer with an upstream fallback.
//!
//! [`ScratchBuffer`] behaves exactly like a [`LinearBuffer`] until its
//! buffer runs out. At that point, if an upstream resource was provided,
//! it requests a replacement buffer from upstream, rebinds itself to the
//! new buffer, and keeps bumping. Without an upstream (or when upstream
//! itself is exhausted) the allocation fails.
//!
//! The old buffer is abandoned on rebind: its live allocations stay
//! valid for as long as the original buffer does, and reclaiming it is
//! the provider's business.

use crate::{AllocError, LinearBuffer, MemoryResource, SharedResource};
use std::any::Any;
use std::ptr::NonNull;
use std::rc::Rc;

/// A bump allocator that refills itself from an upstream resource.
pub struct ScratchBuffer {
    linear: LinearBuffer,
    upstream: Option<SharedResource>,
}

impl ScratchBuffer {
    /// Creates a scratch resource over `length` bytes at `buffer`,
    /// without an upstream: exhaustion is final.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is null or `length` is zero.
    ///
    /// # Safety
    ///
    /// Same contract as [`LinearBuffer::new`].
    pub unsafe fn new(buffer: *mut u8, length: usize) -> Self {
        Self {
            linear: LinearBuffer::new(buffer, length),
            upstream: None,
        }
    }

    /// Creates a scratch resource that falls back to `upstream` when the
    /// local buffer is exhausted.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is null or `length` is zero.
    ///
    /// # Safety
    ///
    /// Same contract as [`LinearBuffer::new`].
    pub unsafe fn with_upstream(buffer: *mut u8, length: usize, upstream: SharedResource) -> Self {
        Self {
            linear: LinearBuffer::new(buffer, length),
            upstream: Some(upstream),
        }
    }

    /// Allocates from the local buffer, refilling from upstream when the
    /// local buffer cannot satisfy the request.
    ///
    /// The replacement buffer is sized to hold the preserved cursor, the
    /// request, and worst-case alignment padding, so the retried bump
    /// cannot fail.
    pub fn allocate(&mut self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        if bytes == 0 || alignment == 0 {
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                alignment,
            });
        }

        if let Ok(ptr) = self.linear.allocate(bytes, alignment) {
            return Ok(ptr);
        }

        let Some(upstream) = &self.upstream else {
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                alignment,
            });
        };

        let replacement_len = self
            .linear
            .count()
            .checked_add(bytes)
            .and_then(|len| len.checked_add(alignment - 1))
            .ok_or(AllocError::OutOfMemory {
                requested: bytes,
                alignment,
            })?;
        let replacement = upstream.borrow_mut().allocate(replacement_len, alignment)?;

        tracing::debug!(
            "scratch buffer exhausted, rebound to a {replacement_len}-byte upstream buffer"
        );
        // SAFETY: upstream handed us exclusive ownership of
        // `replacement_len` writable bytes.
        unsafe { self.linear.change_buffer(replacement.as_ptr(), replacement_len) };
        self.linear.allocate(bytes, alignment)
    }

    /// No-op, like the underlying [`LinearBuffer`].
    pub fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        self.linear.deallocate(ptr, bytes, alignment);
    }

    /// Rewinds the cursor to zero without touching the current buffer.
    pub fn reset(&mut self) {
        self.linear.reset();
    }

    /// Zero-fills the current buffer, then rewinds the cursor.
    pub fn clear(&mut self) {
        self.linear.clear();
    }

    /// Bytes consumed from the current buffer so far.
    pub fn count(&self) -> usize {
        self.linear.count()
    }

    /// Capacity of the current buffer in bytes.
    pub fn length(&self) -> usize {
        self.linear.length()
    }

    fn same_upstream(&self, other: &Self) -> bool {
        match (&self.upstream, &other.upstream) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl MemoryResource for ScratchBuffer {
    fn allocate(&mut self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        ScratchBuffer::allocate(self, bytes, alignment)
    }

    fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        ScratchBuffer::deallocate(self, ptr, bytes, alignment);
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.same_upstream(other) && self.linear.same_state(&other.linear))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("count", &self.linear.count())
            .field("length", &self.linear.length())
            .field("has_upstream", &self.upstream.is_some())
            .finish()
    }
}
