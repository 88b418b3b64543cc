//! Implementation of the physical page allocators.

pub mod buddy;
pub mod chimera;
pub mod fib;
pub mod fibonacci;
pub mod free_list;
pub mod order;
pub mod rangeset;
pub mod registry;

use crate::{
    page::{PageStatus, PageTable, Pfn},
    unit,
};
use core::fmt;

/// Result for every page allocator operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Any error that can happen while setting up, filling or using a page allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The first descriptor of the table does not describe page frame `0`.
    NonZeroBase(Pfn),
    /// The allocator was used before it got a descriptor table.
    Uninitialized,
    /// A page range reached past the end of the descriptor table.
    OutOfBounds(Pfn),
    /// A page that should be made available is already available.
    AlreadyAvailable(Pfn),
    /// A page that should be made available is part of an allocated block.
    InUse(Pfn),
    /// The page does not head a block that was handed out by this allocator.
    NotAllocated(Pfn),
    /// The page range touches frames that are managed by the Fibonacci engine.
    FibonacciRange(Pfn),
    /// A range set ran out of space.
    RangeSet(rangeset::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NonZeroBase(pfn) => write!(
                f,
                "the descriptor table must start at frame 0x0, but starts at {}",
                pfn
            ),
            Error::Uninitialized => f.write_str("the allocator was used before initialization"),
            Error::OutOfBounds(pfn) => {
                write!(f, "page range ends at {}, outside of the descriptor table", pfn)
            }
            Error::AlreadyAvailable(pfn) => write!(f, "page {} is already available", pfn),
            Error::InUse(pfn) => write!(f, "page {} is part of an allocated block", pfn),
            Error::NotAllocated(pfn) => write!(f, "page {} does not head an allocated block", pfn),
            Error::FibonacciRange(pfn) => write!(
                f,
                "page {} is managed by the Fibonacci allocator and can't be reserved",
                pfn
            ),
            Error::RangeSet(err) => write!(f, "{}", err),
        }
    }
}

impl From<rangeset::Error> for Error {
    fn from(err: rangeset::Error) -> Self {
        Error::RangeSet(err)
    }
}

/// Make sure the table describes frame `0` first, the buddy arithmetic relies on it.
pub(crate) fn check_table(name: &str, table: &PageTable<'_>) -> Result<()> {
    let base = table.pgd_to_pfn(0);
    if base != Pfn::new(0) {
        log::error!(
            "{}: failed to initialize page descriptor table: frames should begin at 0x0, got {}",
            name,
            base
        );
        return Err(Error::NonZeroBase(base));
    }

    log::info!(
        "{}: initialized with {:#x} pages ({})",
        name,
        table.len(),
        unit::pages(table.len())
    );
    Ok(())
}

/// The interface every physical page allocation algorithm provides to the kernel.
///
/// All operations assume exclusive access, see [`Locked`](crate::sync::Locked) for a
/// wrapper that serializes them.
pub trait PageAllocator<'t> {
    /// The friendly name of the algorithm, used to select it.
    fn name(&self) -> &'static str;

    /// Hand the descriptor table to this allocator.
    ///
    /// Fails if the first descriptor of the table does not describe frame `0`.
    fn init(&mut self, table: PageTable<'t>) -> Result<()>;

    /// Allocate `2^order` physically contiguous pages.
    ///
    /// Returns the frame number of the first page, or `None` if no block large
    /// enough is free.
    fn allocate_pages(&mut self, order: usize) -> Option<Pfn>;

    /// Free the block that starts at `pfn` and was allocated with the given order.
    ///
    /// Returns the order of the free block the pages ended up in.
    fn free_pages(&mut self, pfn: Pfn, order: usize) -> Result<usize>;

    /// Make the pages `start..start + count` available for allocation.
    fn insert_page_range(&mut self, start: Pfn, count: usize) -> Result<()>;

    /// Permanently take the pages `start..start + count` away from allocation.
    fn remove_page_range(&mut self, start: Pfn, count: usize) -> Result<()>;

    /// Log the content of every free list.
    fn dump_state(&self);

    /// Return the page statistics for this allocator.
    fn stats(&self) -> AllocStats;
}

/// Statistics for a page allocator, in pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// The name of the allocator that collected these stats.
    pub name: &'static str,
    /// The number of frames inside the descriptor table.
    pub total: usize,
    /// The number of frames that are free for allocation.
    pub free: usize,
    /// The number of frames that are handed out.
    pub allocated: usize,
    /// The number of frames that are taken away permanently.
    pub reserved: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given allocator name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            total: 0,
            free: 0,
            allocated: 0,
            reserved: 0,
        }
    }

    /// Collect the statistics of the given table.
    pub fn collect(name: &'static str, table: Option<&PageTable<'_>>) -> Self {
        match table {
            Some(table) => Self {
                name,
                total: table.len(),
                free: table.count(PageStatus::Available),
                allocated: table.count(PageStatus::Allocated),
                reserved: table.count(PageStatus::Reserved),
            },
            None => Self::with_name(name),
        }
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nFree:      {}", unit::pages(self.free))?;
        writeln!(f, "Allocated: {}", unit::pages(self.allocated))?;
        writeln!(f, "Reserved:  {}", unit::pages(self.reserved))?;
        writeln!(f, "Total:     {}", unit::pages(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}
