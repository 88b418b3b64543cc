//! Selection of the page allocation algorithm by its name.

use super::{
    buddy::BuddyAllocator, chimera::ChimeraAllocator, AllocStats, PageAllocator, Result,
};
use crate::page::{PageTable, Pfn};

/// The kernel command line option that selects the page allocator.
pub const CMDLINE_OPTION: &str = "pgalloc.algorithm";

/// The names of all algorithms that can be selected.
pub const NAMES: [&str; 2] = ["buddy", "chimera"];

/// Every page allocation algorithm the kernel can choose from.
#[derive(Debug)]
pub enum Algorithm<'t> {
    /// The binary buddy allocator.
    Buddy(BuddyAllocator<'t>),
    /// The binary and Fibonacci buddy allocator.
    Chimera(ChimeraAllocator<'t>),
}

impl<'t> Algorithm<'t> {
    /// Create the uninitialized algorithm with the given name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "buddy" => Some(Algorithm::Buddy(BuddyAllocator::new())),
            "chimera" => Some(Algorithm::Chimera(ChimeraAllocator::new())),
            _ => None,
        }
    }

    /// Pick the algorithm that is selected by the `pgalloc.algorithm=<name>` option
    /// of the kernel command line.
    ///
    /// Without the option, the buddy allocator is used. Returns `None` if the option
    /// names an unknown algorithm.
    pub fn from_cmdline(cmdline: &str) -> Option<Self> {
        let name = cmdline
            .split_whitespace()
            .filter_map(|arg| {
                let mut parts = arg.splitn(2, '=');
                match (parts.next(), parts.next()) {
                    (Some(CMDLINE_OPTION), Some(value)) => Some(value),
                    _ => None,
                }
            })
            .last()
            .unwrap_or("buddy");

        let algorithm = Self::by_name(name);
        if algorithm.is_none() {
            log::error!(
                "unknown page allocator \"{}\", available are {:?}",
                name,
                NAMES
            );
        }
        algorithm
    }

    fn inner(&self) -> &dyn PageAllocator<'t> {
        match self {
            Algorithm::Buddy(alloc) => alloc,
            Algorithm::Chimera(alloc) => alloc,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PageAllocator<'t> {
        match self {
            Algorithm::Buddy(alloc) => alloc,
            Algorithm::Chimera(alloc) => alloc,
        }
    }
}

impl Default for Algorithm<'_> {
    fn default() -> Self {
        Algorithm::Buddy(BuddyAllocator::new())
    }
}

impl<'t> PageAllocator<'t> for Algorithm<'t> {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn init(&mut self, table: PageTable<'t>) -> Result<()> {
        self.inner_mut().init(table)
    }

    fn allocate_pages(&mut self, order: usize) -> Option<Pfn> {
        self.inner_mut().allocate_pages(order)
    }

    fn free_pages(&mut self, pfn: Pfn, order: usize) -> Result<usize> {
        self.inner_mut().free_pages(pfn, order)
    }

    fn insert_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        self.inner_mut().insert_page_range(start, count)
    }

    fn remove_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        self.inner_mut().remove_page_range(start, count)
    }

    fn dump_state(&self) {
        self.inner().dump_state()
    }

    fn stats(&self) -> AllocStats {
        self.inner().stats()
    }
}
