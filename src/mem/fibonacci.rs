//! The Fibonacci buddy engine that manages the upper half of memory for the
//! [chimera allocator](super::chimera).
//!
//! Block sizes are Fibonacci terms instead of powers of two. A block of `fib(i)` pages
//! splits into a left block of `fib(i - 2)` and a right block of `fib(i - 1)` pages.
//! Freed blocks are put back into the list of their own size and never coalesce.

use super::{
    buddy::BuddyEngine,
    fib::{ceil_idx, fib_to_idx, floor_idx, idx_to_fib, order_to_fib_ceil},
    free_list::{FreeList, ListId},
    order::{order_for_count, size_for_order},
    Error, Result,
};
use crate::page::{PageStatus, PageTable, Pfn, PAGE_SIZE};
use core::mem;

/// The maximum number of Fibonacci free lists.
///
/// `fib(63)` is far larger than any amount of physical memory.
pub const FIB_INDEX_CAPACITY: usize = 64;

const fn list_id(idx: usize) -> ListId {
    ListId::Fibonacci(idx as u8)
}

/// The number of pages inside a block of the given Fibonacci index.
fn fib_pages(idx: usize) -> usize {
    idx_to_fib(idx) as usize
}

fn is_free_head(table: &PageTable<'_>, pfn: Pfn, idx: usize) -> bool {
    let desc = table.descriptor(pfn);
    desc.is_available() && desc.list == Some(list_id(idx))
}

/// Calculate the number of free lists that are needed to manage `pages` pages.
///
/// This is one list for every Fibonacci term that is at most `pages`.
pub fn index_len_for(pages: usize) -> usize {
    floor_idx(pages as u64).map_or(0, |idx| (idx + 1).min(FIB_INDEX_CAPACITY))
}

/// Calculate the number of pages that back a free list index of the given length.
pub fn backing_pages(len: usize) -> usize {
    let bytes = len * mem::size_of::<FreeList>();
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE
}

/// The free lists of the Fibonacci buddy algorithm.
#[derive(Debug)]
pub struct FibonacciEngine {
    free_areas: [FreeList; FIB_INDEX_CAPACITY],
    /// The number of free lists that are in use.
    len: usize,
    /// The block that was taken from the binary engine to back the free list index.
    backing: Option<(Pfn, usize)>,
}

impl FibonacciEngine {
    /// Create a new engine that is not bootstrapped yet.
    pub const fn new() -> Self {
        Self {
            free_areas: [FreeList::EMPTY; FIB_INDEX_CAPACITY],
            len: 0,
            backing: None,
        }
    }

    /// Check if this engine has a backing for its free lists and can take pages.
    pub fn is_active(&self) -> bool {
        self.backing.is_some()
    }

    /// The number of free lists in use.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether there are no free lists in use.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The head and order of the block that backs the free list index.
    pub fn backing(&self) -> Option<(Pfn, usize)> {
        self.backing
    }

    /// Return the free list for the given Fibonacci index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not below [`FIB_INDEX_CAPACITY`].
    pub fn free_area(&self, idx: usize) -> &FreeList {
        &self.free_areas[idx]
    }

    /// The number of pages that are inside the free lists of this engine.
    pub fn free_page_count(&self) -> usize {
        self.free_areas[..self.len]
            .iter()
            .enumerate()
            .map(|(idx, list)| list.len() * fib_pages(idx))
            .sum()
    }

    /// Set up the free list index for `upper_pages` pages.
    ///
    /// The pages that hold the index are allocated from `lower`. If that fails, the
    /// engine stays inactive and `false` is returned, so the caller can try again once
    /// the lower half has more memory.
    pub fn bootstrap(
        &mut self,
        table: &mut PageTable<'_>,
        lower: &mut BuddyEngine,
        upper_pages: usize,
    ) -> bool {
        if self.is_active() {
            return true;
        }

        let len = index_len_for(upper_pages);
        let order = order_for_count(backing_pages(len).max(1));

        let head = match lower.allocate_pages(table, order) {
            Some(head) => head,
            None => {
                log::warn!(
                    "failed to steal {} pages for the Fibonacci free lists",
                    size_for_order(order)
                );
                return false;
            }
        };

        self.len = len;
        self.backing = Some((head, order));

        log::info!(
            "bootstrapped {} Fibonacci free lists at [{:#x}, {:#x})",
            len,
            head.phys_addr(),
            (head + size_for_order(order)).phys_addr()
        );
        true
    }

    fn link(&mut self, table: &mut PageTable<'_>, pfn: Pfn, idx: usize) {
        let size = fib_pages(idx);
        if let Err(other) = self.free_areas[idx].insert(table, list_id(idx), pfn, size) {
            fatal!(
                "block segmentation fault: block [{:#x}, {:#x}) of Fibonacci index {} overlaps the free block at {:#x}",
                pfn.phys_addr(),
                (pfn + size).phys_addr(),
                idx,
                other.phys_addr()
            );
        }
    }

    /// Make the pages `start..start + count` available, by splitting the range into
    /// the largest Fibonacci blocks that fit.
    pub fn insert_page_range(
        &mut self,
        table: &mut PageTable<'_>,
        start: Pfn,
        count: usize,
    ) -> Result<()> {
        if !self.is_active() {
            return Err(Error::Uninitialized);
        }

        let lim = table.check_range(start, count)?;
        table.check_insertable(start, count)?;

        let mut cursor = start;
        while cursor < lim {
            let remaining = (lim - cursor) as u64;
            let idx = floor_idx(remaining).map_or(0, |idx| idx.min(self.len - 1));
            let size = fib_pages(idx);

            table.mark(cursor, size, PageStatus::Available);
            self.link(table, cursor, idx);
            cursor = cursor + size;
        }

        Ok(())
    }

    /// Split the free block at `head` into a `fib(idx - 2)` block on the left and a
    /// `fib(idx - 1)` block on the right.
    ///
    /// Returns the left block, which is always `head`.
    pub fn split_block(&mut self, table: &mut PageTable<'_>, head: Pfn, idx: usize) -> Pfn {
        if idx < 2 || idx >= self.len || !is_free_head(table, head, idx) {
            fatal!("can't split {}: not a free block of Fibonacci index {}", head, idx);
        }

        let right = head + fib_pages(idx - 2);

        self.free_areas[idx].remove(table, head);
        self.link(table, head, idx - 2);
        self.link(table, right, idx - 1);

        log::trace!(
            "split {} page block at {} into {} and {} pages",
            fib_pages(idx),
            head,
            fib_pages(idx - 2),
            fib_pages(idx - 1)
        );
        head
    }

    /// Allocate the smallest Fibonacci block that holds `2^order` pages, splitting
    /// larger blocks if necessary.
    pub fn allocate_pages(&mut self, table: &mut PageTable<'_>, order: usize) -> Option<Pfn> {
        let need = order_to_fib_ceil(order)?;
        let target = ceil_idx(need)?;

        loop {
            let idx = match (target..self.len).find(|&idx| !self.free_areas[idx].is_empty()) {
                Some(idx) => idx,
                None => {
                    log::debug!("no free Fibonacci block with at least {} pages", need);
                    return None;
                }
            };

            if idx_to_fib(idx) != need {
                let head = self.free_areas[idx].head()?;
                self.split_block(table, head, idx);
                continue;
            }

            let head = self.free_areas[idx].pop(table)?;
            let size = fib_pages(idx);
            table.mark(head, size, PageStatus::Allocated);
            // bookmark the end of the block, so `free_pages` can recover its size
            table.descriptor_mut(head).free_next = Some(head + size);

            log::debug!(
                "allocated Fibonacci block [{:#x}, {:#x}) for order {}",
                head.phys_addr(),
                (head + size).phys_addr(),
                order
            );
            return Some(head);
        }
    }

    /// Put the allocated block at `pfn` back into the free list of its size.
    ///
    /// Returns the Fibonacci index of the freed block.
    pub fn free_pages(&mut self, table: &mut PageTable<'_>, pfn: Pfn) -> Result<usize> {
        if !table.contains(pfn) {
            return Err(Error::OutOfBounds(pfn));
        }

        let desc = table.descriptor(pfn);
        if desc.status() != PageStatus::Allocated || desc.free_prev.is_some() {
            return Err(Error::NotAllocated(pfn));
        }

        let idx = desc
            .free_next
            .filter(|&end| end > pfn && end <= table.end())
            .and_then(|end| fib_to_idx((end - pfn) as u64))
            .filter(|&idx| idx < self.len)
            .ok_or(Error::NotAllocated(pfn))?;

        table.mark(pfn, fib_pages(idx), PageStatus::Available);
        self.link(table, pfn, idx);

        log::debug!("freed Fibonacci block of {} pages at {}", fib_pages(idx), pfn);
        Ok(idx)
    }

    /// Log every free list of this engine.
    pub fn dump_state(&self, table: &PageTable<'_>) {
        for (idx, list) in self.free_areas[..self.len].iter().enumerate() {
            log::debug!("[{:>2}] ({:>6} pages) {}", idx, fib_pages(idx), list.display(table));
        }
    }
}

impl Default for FibonacciEngine {
    fn default() -> Self {
        Self::new()
    }
}
