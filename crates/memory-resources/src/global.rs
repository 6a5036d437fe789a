// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The process-wide default arena.
//!
//! A convenience for programs that want to share one arena everywhere
//! instead of threading a handle through every call site. The instance
//! is created lazily on first access and torn down with the thread.
//!
//! The whole allocator family is single-threaded, so the "process-wide"
//! instance is confined to one arena per thread: each thread that calls
//! [`default_arena`] gets its own.

use crate::{AllocError, Arena};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static DEFAULT_ARENA: RefCell<Option<Rc<RefCell<Arena>>>> = const { RefCell::new(None) };
}

/// Returns the calling thread's shared default arena, creating it with
/// the default capacity on first access.
///
/// A failed creation is returned as `OutOfMemory` and retried on the
/// next call.
///
/// # Example
/// ```
/// use memory_resources::default_arena;
///
/// let arena = default_arena().unwrap();
/// let p = arena.borrow_mut().allocate(4, 4).unwrap();
/// arena.borrow_mut().deallocate(p, 4, 4);
/// ```
pub fn default_arena() -> Result<Rc<RefCell<Arena>>, AllocError> {
    DEFAULT_ARENA.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(arena) = slot.as_ref() {
            return Ok(Rc::clone(arena));
        }
        let arena = Rc::new(RefCell::new(Arena::new()?));
        *slot = Some(Rc::clone(&arena));
        Ok(arena)
    })
}
