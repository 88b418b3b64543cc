//! The chimera allocator manages the lower half of memory with the binary buddy engine
//! and the upper half with the Fibonacci buddy engine.
//!
//! The free lists of the Fibonacci engine need memory themselves. Before the first page
//! of the upper half can be managed, a block for them is taken from the lower half. As
//! long as this fails, upper pages are managed by the binary engine instead, and the
//! allocation is tried again on every following insertion.

use super::{
    buddy::{BuddyEngine, MAX_ORDER},
    fib::idx_to_fib,
    fibonacci::FibonacciEngine,
    free_list::Iter,
    order::floor_order,
    rangeset::{Range, RangeSet},
    AllocStats, Error, PageAllocator, Result,
};
use crate::page::{PageTable, Pfn};

/// The allocator that combines the binary and the Fibonacci buddy engines.
#[derive(Debug)]
pub struct ChimeraAllocator<'t> {
    table: Option<PageTable<'t>>,
    lower: BuddyEngine,
    upper: FibonacciEngine,
    /// The first frame of the upper half.
    midpoint: Pfn,
    /// The frames that were handed to the Fibonacci engine.
    fib_ranges: RangeSet,
    /// The number of upper half pages that went to the binary engine instead.
    diverted: usize,
}

impl<'t> ChimeraAllocator<'t> {
    /// Create a new, uninitialized chimera allocator.
    pub const fn new() -> Self {
        Self {
            table: None,
            lower: BuddyEngine::new(),
            upper: FibonacciEngine::new(),
            midpoint: Pfn::new(0),
            fib_ranges: RangeSet::new(),
            diverted: 0,
        }
    }

    /// Return the descriptor table, if this allocator was initialized.
    pub fn table(&self) -> Option<&PageTable<'t>> {
        self.table.as_ref()
    }

    /// The first frame of the upper half.
    pub fn midpoint(&self) -> Pfn {
        self.midpoint
    }

    /// Check if the Fibonacci engine has its free lists and manages upper memory.
    pub fn is_bootstrapped(&self) -> bool {
        self.upper.is_active()
    }

    /// The frame ranges that are managed by the Fibonacci engine.
    pub fn fib_ranges(&self) -> &RangeSet {
        &self.fib_ranges
    }

    /// The number of upper half pages that are managed by the binary engine, because
    /// the Fibonacci engine wasn't ready when they were inserted.
    pub fn diverted(&self) -> usize {
        self.diverted
    }

    /// The binary buddy engine.
    pub fn lower(&self) -> &BuddyEngine {
        &self.lower
    }

    /// The Fibonacci buddy engine.
    pub fn upper(&self) -> &FibonacciEngine {
        &self.upper
    }

    /// Returns an iterator over the heads of the binary engine's free blocks of `order`.
    pub fn lower_blocks(&self, order: usize) -> Iter<'_, 't> {
        match &self.table {
            Some(table) if order <= MAX_ORDER => {
                self.lower.free_area(order).iter(table)
            }
            _ => Iter::empty(),
        }
    }

    /// Returns an iterator over the heads of the Fibonacci engine's free blocks of `idx`.
    pub fn upper_blocks(&self, idx: usize) -> Iter<'_, 't> {
        match &self.table {
            Some(table) if idx < self.upper.len() => self.upper.free_area(idx).iter(table),
            _ => Iter::empty(),
        }
    }

    /// Hand the upper half pages `start..start + count` to the Fibonacci engine,
    /// or to the binary engine if the Fibonacci engine can't take them.
    fn insert_upper(&mut self, start: Pfn, count: usize) -> Result<()> {
        let table = self.table.as_mut().ok_or(Error::Uninitialized)?;
        let upper_pages = table.len() - self.midpoint.as_usize();

        if self.upper.bootstrap(table, &mut self.lower, upper_pages) {
            let range = match Range::from_count(start, count) {
                Some(range) => range,
                None => return Ok(()),
            };

            match self.fib_ranges.insert(range) {
                Ok(()) => return self.upper.insert_page_range(table, start, count),
                Err(err) => log::warn!("can't track Fibonacci pages: {}", err),
            }
        }

        log::warn!(
            "managing upper pages [{}, {}) with the binary buddy engine",
            start,
            start + count
        );
        self.lower.insert_page_range(table, start, count)?;
        self.diverted += count;
        Ok(())
    }
}

impl Default for ChimeraAllocator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'t> PageAllocator<'t> for ChimeraAllocator<'t> {
    fn name(&self) -> &'static str {
        "chimera"
    }

    fn init(&mut self, table: PageTable<'t>) -> Result<()> {
        super::check_table(self.name(), &table)?;

        *self = Self::new();
        self.midpoint = Pfn::new(table.len() / 2);
        self.table = Some(table);
        Ok(())
    }

    fn allocate_pages(&mut self, order: usize) -> Option<Pfn> {
        if order > MAX_ORDER {
            log::debug!("order {} is larger than the maximum order {}", order, MAX_ORDER);
            return None;
        }

        let table = match self.table.as_mut() {
            Some(table) => table,
            None => {
                log::warn!("failed to allocate order {} block: {}", order, Error::Uninitialized);
                return None;
            }
        };

        let mut pfn = self.lower.allocate_pages(table, order);
        if pfn.is_none() {
            pfn = self.upper.allocate_pages(table, order);
        }

        if pfn.is_none() {
            log::error!("can't allocate contiguous memory of order {}", order);
        }
        pfn
    }

    fn free_pages(&mut self, pfn: Pfn, order: usize) -> Result<usize> {
        let table = self.table.as_mut().ok_or(Error::Uninitialized)?;

        // the Fibonacci free lists live there
        if matches!(self.upper.backing(), Some((backing, _)) if backing == pfn) {
            return Err(Error::NotAllocated(pfn));
        }

        if self.fib_ranges.contains(pfn) {
            let idx = self.upper.free_pages(table, pfn)?;
            Ok(floor_order(idx_to_fib(idx) as usize))
        } else {
            self.lower.free_pages(table, pfn, order)
        }
    }

    fn insert_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        let table = self.table.as_mut().ok_or(Error::Uninitialized)?;
        let lim = table.check_range(start, count)?;
        table.check_insertable(start, count)?;

        let mid = self.midpoint;
        if lim <= mid {
            self.lower.insert_page_range(table, start, count)?;
        } else if start >= mid {
            self.insert_upper(start, count)?;
        } else {
            self.lower.insert_page_range(table, start, mid - start)?;
            self.insert_upper(mid, lim - mid)?;
        }

        // upper pages are waiting for the Fibonacci engine, maybe we have enough lower memory now
        if self.diverted > 0 && !self.upper.is_active() {
            let table = self.table.as_mut().ok_or(Error::Uninitialized)?;
            let upper_pages = table.len() - mid.as_usize();
            self.upper.bootstrap(table, &mut self.lower, upper_pages);
        }

        log::info!("inserted pages [{}, {})", start, lim);
        Ok(())
    }

    fn remove_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        let table = self.table.as_mut().ok_or(Error::Uninitialized)?;
        table.check_range(start, count)?;

        let fib_ranges = &self.fib_ranges;
        let overlap =
            Range::from_count(start, count).and_then(|range| fib_ranges.overlapping(range));
        if let Some(other) = overlap {
            log::error!(
                "can't reserve [{}, {}), it overlaps the Fibonacci managed pages [{}, {}]",
                start,
                start + count,
                other.start,
                other.end
            );
            return Err(Error::FibonacciRange(start.max(other.start)));
        }

        self.lower.remove_page_range(table, start, count)
    }

    fn dump_state(&self) {
        log::debug!("CHIMERA STATE:");
        let table = match &self.table {
            Some(table) => table,
            None => {
                log::debug!("<uninitialized>");
                return;
            }
        };

        log::debug!("binary buddy, lower half [0x0, {}):", self.midpoint);
        self.lower.dump_state(table);

        if self.upper.is_active() {
            log::debug!("Fibonacci buddy, upper half [{}, {}):", self.midpoint, table.end());
            self.upper.dump_state(table);
        } else {
            log::debug!("Fibonacci buddy is not bootstrapped");
        }
    }

    fn stats(&self) -> AllocStats {
        AllocStats::collect(self.name(), self.table.as_ref())
    }
}
