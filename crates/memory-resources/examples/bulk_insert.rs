// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pushes 512 integers through the shared default arena and prints the
//! arena's counters and cumulative statistics afterwards.

use memory_resources::default_arena;

fn main() {
    let arena = default_arena().expect("default arena");

    let mut held = Vec::with_capacity(512);
    for value in 0..512i32 {
        let p = arena
            .borrow_mut()
            .allocate(std::mem::size_of::<i32>(), std::mem::align_of::<i32>())
            .expect("arena allocation");
        unsafe { p.as_ptr().cast::<i32>().write(value) };
        held.push(p);
    }

    {
        let arena = arena.borrow();
        println!(
            "after 512 inserts: {} live allocations, {} of {} bytes used",
            arena.allocations(),
            arena.total_used(),
            arena.total_size(),
        );
    }

    for p in held.drain(..) {
        arena
            .borrow_mut()
            .deallocate(p, std::mem::size_of::<i32>(), std::mem::align_of::<i32>());
    }

    let arena = arena.borrow();
    println!(
        "after release: {} live allocations, {} bytes used",
        arena.allocations(),
        arena.total_used(),
    );
    println!("{}", arena.stats().summary());
}
