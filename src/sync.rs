//! Synchronization for the page allocators.
//!
//! The allocators themselves assume exclusive access for every operation. [`Locked`] is the
//! scoped mutual exclusion around them: the lock is taken when an operation starts and
//! released when its guard goes out of scope.

use crate::{
    mem::{order::order_for_count, AllocStats, PageAllocator, Result},
    page::{PageTable, Pfn},
};
use spin::{Mutex, MutexGuard};

/// A page allocator that can be shared, for example inside a `static`.
#[derive(Debug)]
pub struct Locked<A>(Mutex<A>);

impl<A> Locked<A> {
    /// Wrap the given allocator.
    pub const fn new(alloc: A) -> Self {
        Self(Mutex::new(alloc))
    }

    /// Lock the allocator until the returned guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.0.lock()
    }

    /// Run `f` while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut *guard)
    }

    /// Return the allocator, consuming the lock.
    pub fn into_inner(self) -> A {
        self.0.into_inner()
    }
}

impl<'t, A: PageAllocator<'t>> Locked<A> {
    /// The name of the wrapped allocator.
    pub fn name(&self) -> &'static str {
        self.0.lock().name()
    }

    /// Hand the descriptor table to the wrapped allocator.
    pub fn init(&self, table: PageTable<'t>) -> Result<()> {
        self.0.lock().init(table)
    }

    /// Allocate a single page.
    pub fn alloc(&self) -> Option<Pfn> {
        // order 0 is exactly one page
        self.0.lock().allocate_pages(0)
    }

    /// Allocate at least `count` contiguous pages.
    ///
    /// The smallest order that holds `count` pages is allocated, so freeing the pages
    /// must use [`order_for_count`] of the same `count`.
    pub fn alloc_pages(&self, count: usize) -> Option<Pfn> {
        if count == 0 {
            return None;
        }
        self.0.lock().allocate_pages(order_for_count(count))
    }

    /// See [`PageAllocator::allocate_pages`].
    pub fn allocate_pages(&self, order: usize) -> Option<Pfn> {
        self.0.lock().allocate_pages(order)
    }

    /// See [`PageAllocator::free_pages`].
    pub fn free_pages(&self, pfn: Pfn, order: usize) -> Result<usize> {
        self.0.lock().free_pages(pfn, order)
    }

    /// See [`PageAllocator::insert_page_range`].
    pub fn insert_page_range(&self, start: Pfn, count: usize) -> Result<()> {
        self.0.lock().insert_page_range(start, count)
    }

    /// See [`PageAllocator::remove_page_range`].
    pub fn remove_page_range(&self, start: Pfn, count: usize) -> Result<()> {
        self.0.lock().remove_page_range(start, count)
    }

    /// See [`PageAllocator::dump_state`].
    pub fn dump_state(&self) {
        self.0.lock().dump_state()
    }

    /// Return the statistics for the wrapped allocator.
    pub fn stats(&self) -> AllocStats {
        self.0.lock().stats()
    }
}
