//! Intrusive, address ordered free lists of block heads.
//!
//! The links of every list live inside the page descriptors of the block heads and are
//! stored as frame numbers, so a list itself is only a pair of frame numbers.

use crate::page::{PageTable, Pfn};
use core::fmt;

/// Identifies one of the free lists of an allocator.
///
/// Every free block head stores the id of the list it is linked into, which is how the
/// buddy engine knows if a neighbouring block is a free buddy of the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListId {
    /// The binary buddy list for the given order.
    Buddy(u8),
    /// The Fibonacci list for the given Fibonacci index.
    Fibonacci(u8),
}

/// A doubly linked list of free blocks that all have the same size.
///
/// The blocks are kept sorted by ascending frame number, so popping always returns the
/// lowest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    head: Option<Pfn>,
    tail: Option<Pfn>,
    len: usize,
}

impl FreeList {
    /// An empty list, useful to initialize arrays of lists.
    pub const EMPTY: FreeList = FreeList::new();

    /// Create a new, empty `FreeList`.
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns whether this list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The number of blocks inside this list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The lowest block of this list.
    pub fn head(&self) -> Option<Pfn> {
        self.head
    }

    /// The highest block of this list.
    pub fn tail(&self) -> Option<Pfn> {
        self.tail
    }

    /// Link the `size` page block at `pfn` into this list, at the position that keeps the
    /// list sorted.
    ///
    /// If the block would overlap another block of this list, nothing is changed and
    /// the head of the overlapped block is returned as the error.
    pub fn insert(
        &mut self,
        table: &mut PageTable<'_>,
        id: ListId,
        pfn: Pfn,
        size: usize,
    ) -> Result<(), Pfn> {
        let (prev, next) = match (self.head, self.tail) {
            (Some(head), _) if pfn < head => (None, Some(head)),
            (_, Some(tail)) if pfn > tail => (Some(tail), None),
            (Some(head), Some(_)) => self.find_gap(table, head, pfn)?,
            _ => (None, None),
        };

        // the neighbours must not overlap with the new block
        if let Some(prev) = prev {
            if prev + size > pfn {
                return Err(prev);
            }
        }
        if let Some(next) = next {
            if pfn + size > next {
                return Err(next);
            }
        }

        let desc = table.descriptor_mut(pfn);
        desc.free_prev = prev;
        desc.free_next = next;
        desc.list = Some(id);

        match prev {
            Some(prev) => table.descriptor_mut(prev).free_next = Some(pfn),
            None => self.head = Some(pfn),
        }
        match next {
            Some(next) => table.descriptor_mut(next).free_prev = Some(pfn),
            None => self.tail = Some(pfn),
        }

        self.len += 1;
        Ok(())
    }

    /// Walk the list to find the two blocks that surround `pfn`.
    fn find_gap(
        &self,
        table: &PageTable<'_>,
        head: Pfn,
        pfn: Pfn,
    ) -> Result<(Option<Pfn>, Option<Pfn>), Pfn> {
        let mut prev = head;
        loop {
            if prev == pfn {
                return Err(prev);
            }

            match table.descriptor(prev).free_next {
                Some(next) if next <= pfn => prev = next,
                next => return Ok((Some(prev), next)),
            }
        }
    }

    /// Unlink the block at `pfn` from this list.
    ///
    /// `pfn` must be linked into this list.
    pub fn remove(&mut self, table: &mut PageTable<'_>, pfn: Pfn) {
        let desc = table.descriptor_mut(pfn);
        let prev = desc.free_prev.take();
        let next = desc.free_next.take();
        desc.list = None;

        match prev {
            Some(prev) => table.descriptor_mut(prev).free_next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => table.descriptor_mut(next).free_prev = prev,
            None => self.tail = prev,
        }

        self.len -= 1;
    }

    /// Unlink and return the lowest block of this list.
    pub fn pop(&mut self, table: &mut PageTable<'_>) -> Option<Pfn> {
        let head = self.head?;
        self.remove(table, head);
        Some(head)
    }

    /// Returns an iterator over the heads of all blocks in this list, in ascending order.
    pub fn iter<'a, 't>(&self, table: &'a PageTable<'t>) -> Iter<'a, 't> {
        Iter {
            table: Some(table),
            next: self.head,
        }
    }

    /// Returns a value that displays the physical address of every block in this list.
    pub fn display<'a, 't>(&self, table: &'a PageTable<'t>) -> Chain<'a, 't> {
        Chain(self.iter(table))
    }
}

/// Iterator over the block heads of a [`FreeList`].
#[derive(Clone)]
pub struct Iter<'a, 't> {
    table: Option<&'a PageTable<'t>>,
    next: Option<Pfn>,
}

impl Iter<'_, '_> {
    /// An iterator that yields nothing, for allocators that don't have a table yet.
    pub const fn empty() -> Self {
        Self {
            table: None,
            next: None,
        }
    }
}

impl Iterator for Iter<'_, '_> {
    type Item = Pfn;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.next?;
        self.next = self.table?.descriptor(item).free_next;
        Some(item)
    }
}

/// Displays the blocks of a [`FreeList`] as a chain of physical addresses.
pub struct Chain<'a, 't>(Iter<'a, 't>);

impl fmt::Display for Chain<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut blocks = self.0.clone();
        match blocks.next() {
            Some(first) => write!(f, "{:#x}", first.phys_addr())?,
            None => return f.write_str("<empty>"),
        }
        blocks.try_for_each(|block| write!(f, " -> {:#x}", block.phys_addr()))
    }
}
