//! Physical page allocators for the Windy kernel.
//!
//! The kernel hands a fixed table of [page descriptors](page::PageDescriptor), one per
//! physical page frame, to one of the allocators inside [`mem`]. From then on the allocator
//! tracks which frames are free, allocated or reserved and serves power-of-two sized,
//! physically contiguous allocations.
//!
//! Two algorithms are available:
//!
//! - [`BuddyAllocator`](mem::buddy::BuddyAllocator), a classic binary buddy allocator.
//! - [`ChimeraAllocator`](mem::chimera::ChimeraAllocator), which manages the lower half of
//!   memory with the binary buddy engine and the upper half with a Fibonacci buddy engine.
//!
//! The kernel picks one of them by name using [`Algorithm`](mem::registry::Algorithm).
#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(test), no_std)]

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("the page allocators require at least 32 bit wide pointers");

#[macro_use]
mod macros;

pub mod logger;
pub mod mem;
pub mod page;
pub mod sync;
pub mod unit;

pub use mem::{
    buddy::BuddyAllocator, chimera::ChimeraAllocator, registry::Algorithm, AllocStats, Error,
    PageAllocator,
};
pub use page::{PageDescriptor, PageStatus, PageTable, Pfn};
