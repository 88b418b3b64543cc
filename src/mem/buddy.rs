//! Implementation of a binary Buddy Allocator that is responsible for allocating
//! physical page frames, either directly for the kernel or for the
//! [chimera allocator](super::chimera) which uses it for the lower half of memory.

use super::{
    free_list::{self, FreeList, ListId},
    order::{buddy_of, is_aligned, largest_fitting_order, order_from_bookmark, size_for_order},
    AllocStats, Error, PageAllocator, Result,
};
use crate::page::{PageStatus, PageTable, Pfn};

/// The maximum order for the buddy allocator (inclusive).
///
/// A block of the maximum order spans `2^18` pages, which is 1 GiB with 4 KiB pages.
pub const MAX_ORDER: usize = 18;

/// The size of the orders array inside the buddy allocator.
///
/// We add `1` here because this is the size of the array.
pub const ORDER_COUNT: usize = MAX_ORDER + 1;

const fn list_id(order: usize) -> ListId {
    ListId::Buddy(order as u8)
}

/// Check if `pfn` heads a free block that is linked into the list of `order`.
fn is_free_head(table: &PageTable<'_>, pfn: Pfn, order: usize) -> bool {
    let desc = table.descriptor(pfn);
    desc.is_available() && desc.list == Some(list_id(order))
}

/// One step of reserving a page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Reserve the block that starts at the lower end of the range.
    ReserveLow(Pfn, usize),
    /// Reserve the block that ends at the upper end of the range.
    ReserveHigh(Pfn, usize),
    /// Split the block that sticks out of the range.
    Split(Pfn, usize),
}

/// The free areas of the binary buddy algorithm.
///
/// The engine itself doesn't own the descriptor table, every operation borrows it,
/// so more than one engine can share the same table.
#[derive(Debug)]
pub struct BuddyEngine {
    free_areas: [FreeList; ORDER_COUNT],
}

impl BuddyEngine {
    /// Create a new engine without any free blocks.
    pub const fn new() -> Self {
        Self {
            free_areas: [FreeList::EMPTY; ORDER_COUNT],
        }
    }

    /// Return the free list for the given order.
    ///
    /// # Panics
    ///
    /// Panics if `order` is larger than [`MAX_ORDER`].
    pub fn free_area(&self, order: usize) -> &FreeList {
        &self.free_areas[order]
    }

    /// The number of pages that are inside the free lists of this engine.
    pub fn free_page_count(&self) -> usize {
        self.free_areas
            .iter()
            .enumerate()
            .map(|(order, list)| list.len() * size_for_order(order))
            .sum()
    }

    fn link(&mut self, table: &mut PageTable<'_>, pfn: Pfn, order: usize) {
        let size = size_for_order(order);
        if let Err(other) = self.free_areas[order].insert(table, list_id(order), pfn, size) {
            fatal!(
                "block segmentation fault: block [{:#x}, {:#x}) of order {} overlaps the free block at {:#x}",
                pfn.phys_addr(),
                (pfn + size).phys_addr(),
                order,
                other.phys_addr()
            );
        }
    }

    /// Split the free block at `head` into its two halves and put both of them
    /// into the free list of `order - 1`.
    ///
    /// Returns the left half, which is always `head`.
    pub fn split_block(&mut self, table: &mut PageTable<'_>, head: Pfn, order: usize) -> Pfn {
        if order == 0 || order > MAX_ORDER || !is_free_head(table, head, order) {
            fatal!("can't split {}: not a free block of order {}", head, order);
        }

        let half = order - 1;
        let right = head + size_for_order(half);

        self.free_areas[order].remove(table, head);
        self.link(table, head, half);
        self.link(table, right, half);

        log::trace!("split order {} block at {} into {} and {}", order, head, head, right);
        head
    }

    /// Try to merge the free block at `head` with its buddy, and put the combined
    /// block into the free list of `order + 1`.
    ///
    /// Returns the head of the merged block, or `None` if the buddy is not a free
    /// block of the same order. A failed merge is a normal outcome.
    pub fn merge_block(
        &mut self,
        table: &mut PageTable<'_>,
        head: Pfn,
        order: usize,
    ) -> Option<Pfn> {
        if order > MAX_ORDER || !is_free_head(table, head, order) {
            fatal!("can't merge {}: not a free block of order {}", head, order);
        }

        if order == MAX_ORDER {
            return None;
        }

        let buddy = buddy_of(head, order, table.end())?;
        if !is_free_head(table, buddy, order) {
            return None;
        }

        self.free_areas[order].remove(table, head);
        self.free_areas[order].remove(table, buddy);

        let merged = head.min(buddy);
        self.link(table, merged, order + 1);

        log::trace!("merged {} and {} into order {} block", head, buddy, order + 1);
        Some(merged)
    }

    /// Allocate a `2^order` block, splitting larger blocks if necessary.
    ///
    /// Returns `None` if no block of at least `order` is free.
    pub fn allocate_pages(&mut self, table: &mut PageTable<'_>, order: usize) -> Option<Pfn> {
        if order > MAX_ORDER {
            log::debug!("order {} is larger than the maximum order {}", order, MAX_ORDER);
            return None;
        }

        loop {
            // fast path: there's a block with the requested order
            if let Some(head) = self.free_areas[order].pop(table) {
                let size = size_for_order(order);
                table.mark(head, size, PageStatus::Allocated);

                // bookmark the buddy, so `free_pages` can recover the size of the block
                let bookmark = Pfn::new(head.as_usize() ^ size);
                let desc = table.descriptor_mut(head);
                if bookmark < head {
                    desc.free_prev = Some(bookmark);
                } else {
                    desc.free_next = Some(bookmark);
                }

                log::debug!(
                    "allocated block [{:#x}, {:#x}) of order {}",
                    head.phys_addr(),
                    (head + size).phys_addr(),
                    order
                );
                return Some(head);
            }

            // slow path: split the smallest larger block and retry
            let larger = (order + 1..ORDER_COUNT).find(|&o| !self.free_areas[o].is_empty());
            let split_order = match larger {
                Some(split_order) => split_order,
                None => {
                    log::debug!("no free block of order {} or larger", order);
                    return None;
                }
            };

            let head = self.free_areas[split_order].head()?;
            self.split_block(table, head, split_order);
        }
    }

    /// Free the allocated block at `pfn` and merge it with its buddies.
    ///
    /// The real size of the block is taken from the bookmark that [`allocate_pages`]
    /// left in the head. Merging goes on as long as the buddy is free, and the order of
    /// the resulting free block is returned. If it is below `order`, a part of the
    /// block the caller expected is still allocated and this is logged as an error.
    ///
    /// [`allocate_pages`]: BuddyEngine::allocate_pages
    pub fn free_pages(
        &mut self,
        table: &mut PageTable<'_>,
        pfn: Pfn,
        order: usize,
    ) -> Result<usize> {
        if !table.contains(pfn) {
            return Err(Error::OutOfBounds(pfn));
        }

        let desc = table.descriptor(pfn);
        if desc.status() != PageStatus::Allocated {
            return Err(Error::NotAllocated(pfn));
        }

        let actual = desc
            .free_prev
            .or(desc.free_next)
            .and_then(|bookmark| order_from_bookmark(pfn, bookmark))
            .filter(|&actual| {
                actual <= MAX_ORDER
                    && is_aligned(pfn, actual)
                    && pfn.as_usize() + size_for_order(actual) <= table.end().as_usize()
            })
            .ok_or(Error::NotAllocated(pfn))?;

        if actual != order {
            log::warn!(
                "freeing {} with order {}, but it was allocated with order {}",
                pfn,
                order,
                actual
            );
        }

        table.mark(pfn, size_for_order(actual), PageStatus::Available);
        self.link(table, pfn, actual);

        let mut head = pfn;
        let mut reached = actual;
        while let Some(merged) = self.merge_block(table, head, reached) {
            head = merged;
            reached += 1;
        }

        if reached < order {
            log::error!(
                "partial free of {}: only reached order {} instead of {}, a sibling block is still in use",
                pfn,
                reached,
                order
            );
        }

        log::debug!(
            "freed {} of order {}, now inside order {} block at {}",
            pfn,
            actual,
            reached,
            head
        );
        Ok(reached)
    }

    /// Make the pages `start..start + count` available, by splitting the range into
    /// the largest aligned blocks that fit.
    pub fn insert_page_range(
        &mut self,
        table: &mut PageTable<'_>,
        start: Pfn,
        count: usize,
    ) -> Result<()> {
        let lim = table.check_range(start, count)?;
        table.check_insertable(start, count)?;

        let mut cursor = start;
        while cursor < lim {
            let order = largest_fitting_order(cursor, lim, MAX_ORDER);
            let size = size_for_order(order);

            table.mark(cursor, size, PageStatus::Available);
            self.link(table, cursor, order);
            cursor = cursor + size;
        }

        Ok(())
    }

    /// Reserve the pages `start..start + count`.
    ///
    /// Every page inside the range must be part of a free block. Blocks that stick out of
    /// the range are split until the range is covered by blocks that are completely
    /// inside of it. If some page of the range is not free, the free lists don't match
    /// the table anymore, and this is fatal.
    pub fn remove_page_range(
        &mut self,
        table: &mut PageTable<'_>,
        start: Pfn,
        count: usize,
    ) -> Result<()> {
        let mut lim = table.check_range(start, count)?;
        let mut base = start;

        while base < lim {
            match self.next_step(table, base, lim) {
                Some(Step::ReserveLow(block, order)) => {
                    self.reserve_block(table, block, order);
                    base = block + size_for_order(order);
                }
                Some(Step::ReserveHigh(block, order)) => {
                    self.reserve_block(table, block, order);
                    lim = block;
                }
                Some(Step::Split(block, order)) => {
                    self.split_block(table, block, order);
                }
                None => fatal!(
                    "no free block contains the pages [{:#x}, {:#x})",
                    base.phys_addr(),
                    lim.phys_addr()
                ),
            }
        }

        Ok(())
    }

    /// Search the free lists, starting at the largest order, for a block that can
    /// be reserved or must be split to reserve `base..lim`.
    fn next_step(&self, table: &PageTable<'_>, base: Pfn, lim: Pfn) -> Option<Step> {
        for (order, list) in self.free_areas.iter().enumerate().rev() {
            let size = size_for_order(order);

            for block in list.iter(table) {
                let block_lim = block + size;
                if block_lim <= base {
                    continue;
                }
                if block >= lim {
                    break;
                }

                if block < base || block_lim > lim {
                    return Some(Step::Split(block, order));
                } else if block == base {
                    return Some(Step::ReserveLow(block, order));
                } else if block_lim == lim {
                    return Some(Step::ReserveHigh(block, order));
                }
                // blocks in the middle get reserved once one of the ends reaches them
            }
        }

        None
    }

    /// Take the free block at `head` out of its free list and reserve all of its pages.
    pub fn reserve_block(&mut self, table: &mut PageTable<'_>, head: Pfn, order: usize) {
        if order > MAX_ORDER || !is_free_head(table, head, order) {
            fatal!("can't reserve {}: not a free block of order {}", head, order);
        }

        let size = size_for_order(order);
        self.free_areas[order].remove(table, head);
        table.mark(head, size, PageStatus::Reserved);

        log::info!(
            "reserved block [{:#x}, {:#x})",
            head.phys_addr(),
            (head + size).phys_addr()
        );
    }

    /// Log every free list of this engine.
    pub fn dump_state(&self, table: &PageTable<'_>) {
        for (order, list) in self.free_areas.iter().enumerate() {
            log::debug!("[{:>2}] {}", order, list.display(table));
        }
    }
}

impl Default for BuddyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The central structure that is responsible for allocating pages
/// using the buddy algorithm.
#[derive(Debug)]
pub struct BuddyAllocator<'t> {
    table: Option<PageTable<'t>>,
    engine: BuddyEngine,
}

impl<'t> BuddyAllocator<'t> {
    /// Create a new, uninitialized buddy allocator.
    pub const fn new() -> Self {
        Self {
            table: None,
            engine: BuddyEngine::new(),
        }
    }

    /// Return the descriptor table, if this allocator was initialized.
    pub fn table(&self) -> Option<&PageTable<'t>> {
        self.table.as_ref()
    }

    /// Returns an iterator over the heads of every free block of the given order.
    pub fn free_blocks(&self, order: usize) -> free_list::Iter<'_, 't> {
        match &self.table {
            Some(table) if order <= MAX_ORDER => self.engine.free_area(order).iter(table),
            _ => free_list::Iter::empty(),
        }
    }

    fn parts(&mut self) -> Result<(&mut PageTable<'t>, &mut BuddyEngine)> {
        let table = self.table.as_mut().ok_or(Error::Uninitialized)?;
        Ok((table, &mut self.engine))
    }
}

impl Default for BuddyAllocator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'t> PageAllocator<'t> for BuddyAllocator<'t> {
    fn name(&self) -> &'static str {
        "buddy"
    }

    fn init(&mut self, table: PageTable<'t>) -> Result<()> {
        super::check_table(self.name(), &table)?;

        self.table = Some(table);
        self.engine = BuddyEngine::new();
        Ok(())
    }

    fn allocate_pages(&mut self, order: usize) -> Option<Pfn> {
        let (table, engine) = match self.parts() {
            Ok(parts) => parts,
            Err(err) => {
                log::warn!("failed to allocate order {} block: {}", order, err);
                return None;
            }
        };

        let pfn = engine.allocate_pages(table, order);
        if pfn.is_none() {
            log::error!(
                "can't allocate contiguous memory of order {} ({:#x} pages)",
                order,
                size_for_order(order.min(MAX_ORDER + 1))
            );
        }
        pfn
    }

    fn free_pages(&mut self, pfn: Pfn, order: usize) -> Result<usize> {
        let (table, engine) = self.parts()?;
        engine.free_pages(table, pfn, order)
    }

    fn insert_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        let (table, engine) = self.parts()?;
        engine.insert_page_range(table, start, count)?;

        log::info!("inserted pages [{}, {})", start, start + count);
        Ok(())
    }

    fn remove_page_range(&mut self, start: Pfn, count: usize) -> Result<()> {
        let (table, engine) = self.parts()?;
        engine.remove_page_range(table, start, count)
    }

    fn dump_state(&self) {
        log::debug!("BUDDY STATE:");
        match &self.table {
            Some(table) => self.engine.dump_state(table),
            None => log::debug!("<uninitialized>"),
        }
    }

    fn stats(&self) -> AllocStats {
        AllocStats::collect(self.name(), self.table.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageDescriptor;

    fn allocator(descs: &mut [PageDescriptor]) -> BuddyAllocator<'_> {
        let len = descs.len();
        let mut alloc = BuddyAllocator::new();
        alloc.init(PageTable::new(descs, Pfn::new(0))).unwrap();
        alloc.insert_page_range(Pfn::new(0), len).unwrap();
        alloc
    }

    fn blocks(alloc: &BuddyAllocator<'_>, order: usize) -> Vec<usize> {
        alloc.free_blocks(order).map(Pfn::as_usize).collect()
    }

    fn status(alloc: &BuddyAllocator<'_>, pfn: usize) -> PageStatus {
        alloc.table().unwrap().descriptor(Pfn::new(pfn)).status()
    }

    #[test]
    fn init_requires_frame_zero() {
        let mut descs = vec![PageDescriptor::INVALID; 16];
        let mut alloc = BuddyAllocator::new();

        let res = alloc.init(PageTable::new(&mut descs, Pfn::new(0x100)));
        assert_eq!(res, Err(Error::NonZeroBase(Pfn::new(0x100))));
        assert!(alloc.table().is_none());
        assert_eq!(alloc.allocate_pages(0), None);
        assert_eq!(
            alloc.free_pages(Pfn::new(0), 0),
            Err(Error::Uninitialized)
        );
    }

    #[test]
    fn allocate_splits_down() {
        let mut descs = vec![PageDescriptor::INVALID; 1 << MAX_ORDER];
        let mut alloc = allocator(&mut descs);
        assert_eq!(blocks(&alloc, MAX_ORDER), vec![0]);

        assert_eq!(alloc.allocate_pages(3), Some(Pfn::new(0)));

        assert!(blocks(&alloc, MAX_ORDER).is_empty());
        assert_eq!(blocks(&alloc, 17), vec![1 << 17]);
        for order in 3..17 {
            assert_eq!(blocks(&alloc, order), vec![1 << order], "order {}", order);
        }
        for order in 0..3 {
            assert!(blocks(&alloc, order).is_empty());
        }

        (0..8).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Allocated));
        assert_eq!(status(&alloc, 8), PageStatus::Available);
    }

    #[test]
    fn allocate_exhaustion() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        assert_eq!(alloc.allocate_pages(4), None);
        assert_eq!(alloc.allocate_pages(MAX_ORDER + 1), None);
        assert_eq!(alloc.allocate_pages(3), Some(Pfn::new(0)));
        assert_eq!(alloc.allocate_pages(0), None);
    }

    #[test]
    fn remove_inside_block() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);
        assert_eq!(blocks(&alloc, 3), vec![0]);

        alloc.remove_page_range(Pfn::new(5), 3).unwrap();

        assert!(blocks(&alloc, 3).is_empty());
        assert_eq!(blocks(&alloc, 2), vec![0]);
        assert!(blocks(&alloc, 1).is_empty());
        assert_eq!(blocks(&alloc, 0), vec![4]);

        (0..5).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Available));
        (5..8).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Reserved));
    }

    #[test]
    fn remove_spanning_blocks() {
        let mut descs = vec![PageDescriptor::INVALID; 64];
        let mut alloc = allocator(&mut descs);

        alloc.remove_page_range(Pfn::new(3), 42).unwrap();

        let stats = alloc.stats();
        assert_eq!(stats.reserved, 42);
        assert_eq!(stats.free, 22);
        (0..3).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Available));
        (3..45).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Reserved));
        (45..64).for_each(|pfn| assert_eq!(status(&alloc, pfn), PageStatus::Available));

        assert_eq!(blocks(&alloc, 0), vec![2, 45]);
        assert_eq!(blocks(&alloc, 1), vec![0, 46]);
        assert_eq!(blocks(&alloc, 2), vec![]);
        assert_eq!(blocks(&alloc, 3), vec![]);
        assert_eq!(blocks(&alloc, 4), vec![48]);
    }

    #[test]
    #[should_panic]
    fn remove_reserved_pages() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        alloc.remove_page_range(Pfn::new(2), 2).unwrap();
        let _ = alloc.remove_page_range(Pfn::new(0), 4);
    }

    #[test]
    fn split_merge_round_trip() {
        let mut descs = vec![PageDescriptor::INVALID; 16];
        let mut table = PageTable::new(&mut descs, Pfn::new(0));
        let mut engine = BuddyEngine::new();
        engine.insert_page_range(&mut table, Pfn::new(0), 16).unwrap();

        let left = engine.split_block(&mut table, Pfn::new(0), 4);
        assert_eq!(left, Pfn::new(0));
        assert_eq!(engine.free_area(3).len(), 2);
        assert!(engine.free_area(4).is_empty());

        let merged = engine.merge_block(&mut table, Pfn::new(8), 3);
        assert_eq!(merged, Some(Pfn::new(0)));
        assert_eq!(engine.free_area(4).head(), Some(Pfn::new(0)));
        assert_eq!(engine.free_area(4).len(), 1);
        assert!(engine.free_area(3).is_empty());
    }

    #[test]
    fn merge_needs_free_buddy() {
        let mut descs = vec![PageDescriptor::INVALID; 4];
        let mut table = PageTable::new(&mut descs, Pfn::new(0));
        let mut engine = BuddyEngine::new();
        engine.insert_page_range(&mut table, Pfn::new(0), 4).unwrap();

        assert_eq!(engine.allocate_pages(&mut table, 0), Some(Pfn::new(0)));
        assert_eq!(engine.free_area(0).head(), Some(Pfn::new(1)));
        assert_eq!(engine.merge_block(&mut table, Pfn::new(1), 0), None);
        assert_eq!(engine.merge_block(&mut table, Pfn::new(2), 1), None);
    }

    #[test]
    fn free_merges_up() {
        let mut descs = vec![PageDescriptor::INVALID; 16];
        let mut alloc = allocator(&mut descs);

        let a = alloc.allocate_pages(2).unwrap();
        let b = alloc.allocate_pages(0).unwrap();
        assert_eq!((a, b), (Pfn::new(0), Pfn::new(4)));

        // `b` keeps its buddies from merging back into the order 4 block
        assert_eq!(alloc.free_pages(a, 2), Ok(2));
        assert_eq!(alloc.free_pages(b, 0), Ok(4));
        assert_eq!(blocks(&alloc, 4), vec![0]);
        assert_eq!(alloc.stats().free, 16);
    }

    #[test]
    fn partial_free() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        let a = alloc.allocate_pages(1).unwrap();
        let b = alloc.allocate_pages(1).unwrap();
        assert_eq!((a, b), (Pfn::new(0), Pfn::new(2)));

        assert_eq!(alloc.free_pages(a, 3), Ok(1));
        assert_eq!(blocks(&alloc, 1), vec![0]);
    }

    #[test]
    fn free_uses_allocated_order() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        let a = alloc.allocate_pages(2).unwrap();
        assert_eq!(alloc.free_pages(a, 0), Ok(3));
        assert_eq!(alloc.stats().free, 8);
    }

    #[test]
    fn invalid_frees() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        let a = alloc.allocate_pages(1).unwrap();
        assert_eq!(alloc.free_pages(a + 1, 0), Err(Error::NotAllocated(a + 1)));
        assert_eq!(alloc.free_pages(Pfn::new(4), 0), Err(Error::NotAllocated(Pfn::new(4))));
        assert_eq!(alloc.free_pages(Pfn::new(8), 0), Err(Error::OutOfBounds(Pfn::new(8))));

        assert_eq!(alloc.free_pages(a, 1), Ok(3));
        assert_eq!(alloc.free_pages(a, 1), Err(Error::NotAllocated(a)));
    }

    #[test]
    fn insert_rejects_free_pages() {
        let mut descs = vec![PageDescriptor::INVALID; 16];
        let mut alloc = BuddyAllocator::new();
        alloc.init(PageTable::new(&mut descs, Pfn::new(0))).unwrap();

        alloc.insert_page_range(Pfn::new(4), 4).unwrap();
        assert_eq!(
            alloc.insert_page_range(Pfn::new(0), 6),
            Err(Error::AlreadyAvailable(Pfn::new(4)))
        );
        assert_eq!(
            alloc.insert_page_range(Pfn::new(12), 8),
            Err(Error::OutOfBounds(Pfn::new(20)))
        );
        assert_eq!(alloc.stats().free, 4);
    }

    #[test]
    fn insert_rejects_allocated_pages() {
        let mut descs = vec![PageDescriptor::INVALID; 8];
        let mut alloc = allocator(&mut descs);

        assert_eq!(alloc.allocate_pages(3), Some(Pfn::new(0)));
        assert_eq!(
            alloc.insert_page_range(Pfn::new(0), 8),
            Err(Error::InUse(Pfn::new(0)))
        );

        // the block is still handed out exactly once
        assert_eq!(alloc.allocate_pages(3), None);
        assert_eq!(alloc.stats().allocated, 8);
        assert_eq!(alloc.free_pages(Pfn::new(0), 3), Ok(3));
    }

    #[test]
    fn insert_decomposes_range() {
        let mut descs = vec![PageDescriptor::INVALID; 64];
        let mut alloc = BuddyAllocator::new();
        alloc.init(PageTable::new(&mut descs, Pfn::new(0))).unwrap();

        alloc.insert_page_range(Pfn::new(3), 38).unwrap();

        assert_eq!(blocks(&alloc, 0), vec![3, 40]);
        assert_eq!(blocks(&alloc, 1), vec![]);
        assert_eq!(blocks(&alloc, 2), vec![4]);
        assert_eq!(blocks(&alloc, 3), vec![8, 32]);
        assert_eq!(blocks(&alloc, 4), vec![16]);
        assert_eq!(alloc.stats().free, 38);
        assert_eq!(status(&alloc, 2), PageStatus::Invalid);
        assert_eq!(status(&alloc, 41), PageStatus::Invalid);
    }

    #[test]
    fn conservation() {
        let mut descs = vec![PageDescriptor::INVALID; 1 << 10];
        let mut alloc = allocator(&mut descs);
        let mut live = Vec::new();
        let mut state = 0x2545_F491_4F6C_DD1Du64;

        for _ in 0..2000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;

            if state % 3 != 0 || live.is_empty() {
                let order = (state >> 8) as usize % 5;
                if let Some(pfn) = alloc.allocate_pages(order) {
                    assert!(is_aligned(pfn, order));
                    live.push((pfn, order));
                }
            } else {
                let (pfn, order) = live.swap_remove((state >> 8) as usize % live.len());
                alloc.free_pages(pfn, order).unwrap();
            }

            let outstanding: usize = live.iter().map(|&(_, order)| size_for_order(order)).sum();
            let stats = alloc.stats();
            assert_eq!(stats.free, (1 << 10) - outstanding);
            assert_eq!(stats.allocated, outstanding);
            assert_eq!(alloc.engine.free_page_count(), stats.free);
        }
    }

    #[test]
    fn stats() {
        let mut descs = vec![PageDescriptor::INVALID; 32];
        let mut alloc = allocator(&mut descs);

        alloc.allocate_pages(2).unwrap();
        alloc.remove_page_range(Pfn::new(16), 8).unwrap();

        assert_eq!(
            alloc.stats(),
            AllocStats {
                name: "buddy",
                total: 32,
                free: 20,
                allocated: 4,
                reserved: 8,
            }
        );
    }
}
