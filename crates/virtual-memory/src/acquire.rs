// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Platform-specific acquisition and release of regions.
//!
//! On POSIX, acquisition is `mmap` with `MAP_PRIVATE | MAP_ANONYMOUS`.
//! Transient failures (`ENOMEM`, `EOVERFLOW`, `EAGAIN`) are retried at
//! half the previous size, down to a floor of one sixteenth of the
//! original request; any other errno aborts the retry loop. On Windows,
//! acquisition is a single `VirtualAlloc` with `MEM_COMMIT | MEM_RESERVE`
//! and committed bytes are tracked in [`COMMIT_PAGE_SIZE`] granules.
//!
//! [`COMMIT_PAGE_SIZE`]: crate::COMMIT_PAGE_SIZE

use crate::{RegionError, RegionHeader};
use std::ptr::NonNull;

/// Maps one region of `size` bytes from the OS and writes a null-`next`
/// header at its base.
///
/// On POSIX the mapping may come back smaller than `size` after the
/// retry loop; the caller is only guaranteed the header plus whatever
/// the OS granted. In practice the retry path is exercised only under
/// severe memory pressure.
pub fn acquire_region(size: usize) -> Result<NonNull<RegionHeader>, RegionError> {
    let region = platform::map_region(size)?;
    // SAFETY: `map_region` returned a fresh read-write mapping of at
    // least header size.
    unsafe { (*region.as_ptr()).next = std::ptr::null_mut() };
    Ok(region)
}

/// Releases every region in the chain rooted at `first`, tail first.
///
/// Infallible; unmap errors are ignored, matching the contract that
/// teardown always completes.
///
/// # Safety
///
/// `first` must head a chain of regions previously returned by
/// [`acquire_region`] that have not yet been released, and no live
/// pointers into any of those regions may be dereferenced afterwards.
pub unsafe fn release_chain(first: NonNull<RegionHeader>) {
    let next = (*first.as_ptr()).next;
    if let Some(next) = NonNull::new(next) {
        release_chain(next);
    }
    platform::unmap_region(first);
}

#[cfg(unix)]
mod platform {
    use crate::{RegionError, RegionHeader, REGION_SIZE};
    use std::ptr::{self, NonNull};

    pub(super) fn map_region(size: usize) -> Result<NonNull<RegionHeader>, RegionError> {
        let floor = (size / 16).max(1);
        let mut attempt = size;

        while attempt >= floor {
            // SAFETY: anonymous private mapping, no file descriptor
            // involved; the kernel picks the address.
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    attempt,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };

            if ptr != libc::MAP_FAILED && !ptr.is_null() {
                if attempt != size {
                    tracing::warn!("mapped {attempt} of {size} requested bytes after retrying");
                }
                return Ok(unsafe { NonNull::new_unchecked(ptr.cast::<RegionHeader>()) });
            }

            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno != libc::ENOMEM && errno != libc::EOVERFLOW && errno != libc::EAGAIN {
                return Err(RegionError::Exhausted {
                    requested: size,
                    smallest: attempt,
                });
            }

            tracing::warn!("mmap of {attempt} bytes failed (errno {errno}), retrying at half size");
            attempt /= 2;
        }

        Err(RegionError::Exhausted {
            requested: size,
            smallest: floor,
        })
    }

    pub(super) unsafe fn unmap_region(region: NonNull<RegionHeader>) {
        // Unmapping a range that is partially unmapped is not an error,
        // so a region shrunk by the retry loop is handled too.
        libc::munmap(region.as_ptr().cast(), REGION_SIZE);
    }
}

#[cfg(windows)]
mod platform {
    use crate::{RegionError, RegionHeader, COMMIT_PAGE_SIZE, REGION_SIZE};
    use std::ptr::{self, NonNull};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };

    /// Committed bytes across all live mappings, in commit-page granules.
    pub(super) static TOTAL_COMMIT: AtomicUsize = AtomicUsize::new(0);

    fn commit_granules(size: usize) -> usize {
        size.div_ceil(COMMIT_PAGE_SIZE) * COMMIT_PAGE_SIZE
    }

    pub(super) fn map_region(size: usize) -> Result<NonNull<RegionHeader>, RegionError> {
        // SAFETY: null base address lets the OS pick placement.
        let ptr = unsafe {
            VirtualAlloc(ptr::null(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE)
        };
        match NonNull::new(ptr.cast::<RegionHeader>()) {
            Some(region) => {
                TOTAL_COMMIT.fetch_add(commit_granules(size), Ordering::Relaxed);
                Ok(region)
            }
            None => Err(RegionError::Exhausted {
                requested: size,
                smallest: size,
            }),
        }
    }

    pub(super) unsafe fn unmap_region(region: NonNull<RegionHeader>) {
        VirtualFree(region.as_ptr().cast(), 0, MEM_RELEASE);
        let granules = commit_granules(REGION_SIZE);
        let _ = TOTAL_COMMIT.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            Some(current.saturating_sub(granules))
        });
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use crate::{RegionError, RegionHeader};
    use std::ptr::NonNull;

    pub(super) fn map_region(_size: usize) -> Result<NonNull<RegionHeader>, RegionError> {
        Err(RegionError::UnsupportedPlatform)
    }

    pub(super) unsafe fn unmap_region(_region: NonNull<RegionHeader>) {}
}

/// Committed bytes currently held across all live mappings.
///
/// Windows only: POSIX mappings commit lazily, so there is nothing to
/// report there.
#[cfg(windows)]
pub fn total_commit() -> usize {
    platform::TOTAL_COMMIT.load(std::sync::atomic::Ordering::Relaxed)
}
