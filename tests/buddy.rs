use chimera::{
    mem::{
        buddy::MAX_ORDER,
        order::{is_aligned, size_for_order},
    },
    BuddyAllocator, Error, PageAllocator, PageDescriptor, PageStatus, PageTable, Pfn,
};

/// A small xorshift generator, so every run shuffles the same way.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for idx in (1..items.len()).rev() {
            let other = self.below(idx + 1);
            items.swap(idx, other);
        }
    }
}

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

/// Every free block as `(head, order)`, sorted by address.
fn all_blocks(alloc: &BuddyAllocator<'_>) -> Vec<(usize, usize)> {
    let mut all = (0..=MAX_ORDER)
        .flat_map(|order| blocks(alloc, order).into_iter().map(move |head| (head, order)))
        .collect::<Vec<_>>();
    all.sort_unstable();
    all
}

#[test]
fn allocate_order_three_from_full_memory() {
    let mut descs = vec![PageDescriptor::INVALID; 1 << 18];
    let mut alloc = allocator(&mut descs);
    assert_eq!(blocks(&alloc, 18), vec![0]);

    assert_eq!(alloc.allocate_pages(3), Some(Pfn::new(0)));

    // the right halves of every split stay behind
    for order in 3..18 {
        assert_eq!(blocks(&alloc, order), vec![1 << order], "order {}", order);
    }
    for order in (0..3).chain(Some(18)) {
        assert!(blocks(&alloc, order).is_empty(), "order {}", order);
    }

    let stats = alloc.stats();
    assert_eq!((stats.free, stats.allocated), ((1 << 18) - 8, 8));
}

#[test]
fn remove_tail_of_free_block() {
    let mut descs = vec![PageDescriptor::INVALID; 8];
    let mut alloc = allocator(&mut descs);

    alloc.remove_page_range(Pfn::new(5), 3).unwrap();

    assert_eq!(all_blocks(&alloc), vec![(0, 2), (4, 0)]);
    let table = alloc.table().unwrap();
    for pfn in 0..8 {
        let expected = if pfn < 5 {
            PageStatus::Available
        } else {
            PageStatus::Reserved
        };
        assert_eq!(table.descriptor(Pfn::new(pfn)).status(), expected);
    }
}

#[test]
fn full_circle() {
    let mut descs = vec![PageDescriptor::INVALID; 1 << 18];
    let mut alloc = allocator(&mut descs);

    let mut pages = Vec::with_capacity(1 << 18);
    while let Some(pfn) = alloc.allocate_pages(0) {
        pages.push(pfn);
    }

    // lowest page first, so every page comes out exactly once in ascending order
    assert_eq!(pages.len(), 1 << 18);
    assert!(pages.iter().enumerate().all(|(idx, pfn)| pfn.as_usize() == idx));
    assert_eq!(alloc.stats().free, 0);

    let mut reached = 0;
    for pfn in pages {
        reached = alloc.free_pages(pfn, 0).unwrap();
    }

    assert_eq!(reached, MAX_ORDER);
    assert_eq!(all_blocks(&alloc), vec![(0, MAX_ORDER)]);
}

#[test]
fn full_circle_shuffled() {
    let mut descs = vec![PageDescriptor::INVALID; 1 << 10];
    let mut alloc = allocator(&mut descs);
    let mut rng = XorShift(0x2545_F491_4F6C_DD1D);

    let mut pages = Vec::new();
    while let Some(pfn) = alloc.allocate_pages(0) {
        pages.push(pfn);
    }
    assert_eq!(pages.len(), 1 << 10);

    rng.shuffle(&mut pages);
    for pfn in pages {
        alloc.free_pages(pfn, 0).unwrap();
    }

    assert_eq!(all_blocks(&alloc), vec![(0, 10)]);
    assert_eq!(alloc.stats().free, 1 << 10);
}

#[test]
fn insert_decomposes_into_maximal_blocks() {
    const PAGES: usize = 256;

    for start in 0..48 {
        for count in 1..=(PAGES - start).min(120) {
            let mut descs = vec![PageDescriptor::INVALID; PAGES];
            let mut alloc = BuddyAllocator::new();
            alloc.init(PageTable::new(&mut descs, Pfn::new(0))).unwrap();
            alloc.insert_page_range(Pfn::new(start), count).unwrap();

            let lim = start + count;
            let mut cursor = start;
            for (head, order) in all_blocks(&alloc) {
                let size = size_for_order(order);

                // the blocks cover the range without gaps
                assert_eq!(head, cursor, "range [{}, {})", start, lim);
                assert!(is_aligned(Pfn::new(head), order));

                // greedy: the next larger block would be unaligned or stick out
                let larger = size_for_order(order + 1);
                assert!(
                    !is_aligned(Pfn::new(head), order + 1) || head + larger > lim,
                    "block {} of order {} in [{}, {}) is not maximal",
                    head,
                    order,
                    start,
                    lim
                );
                cursor += size;
            }
            assert_eq!(cursor, lim);
            assert_eq!(alloc.stats().free, count);
        }
    }
}

#[test]
fn random_workload() {
    const PAGES: usize = 1 << 11;

    let mut descs = vec![PageDescriptor::INVALID; PAGES];
    let mut alloc = allocator(&mut descs);
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut owner = vec![false; PAGES];
    let mut live = Vec::<(Pfn, usize)>::new();

    for _ in 0..4000 {
        if live.is_empty() || rng.below(3) != 0 {
            let order = rng.below(6);
            if let Some(pfn) = alloc.allocate_pages(order) {
                assert!(is_aligned(pfn, order), "{} is not aligned to order {}", pfn, order);

                let range = pfn.as_usize()..pfn.as_usize() + size_for_order(order);
                assert!(owner[range.clone()].iter().all(|&used| !used), "{} overlaps", pfn);
                owner[range].iter_mut().for_each(|used| *used = true);
                live.push((pfn, order));
            }
        } else {
            let (pfn, order) = live.swap_remove(rng.below(live.len()));
            assert!(alloc.free_pages(pfn, order).unwrap() >= order);

            let range = pfn.as_usize()..pfn.as_usize() + size_for_order(order);
            owner[range].iter_mut().for_each(|used| *used = false);
        }

        let used = live.iter().map(|&(_, order)| size_for_order(order)).sum::<usize>();
        let stats = alloc.stats();
        assert_eq!(stats.allocated, used);
        assert_eq!(stats.free + stats.allocated, PAGES);
    }

    for (pfn, order) in live {
        alloc.free_pages(pfn, order).unwrap();
    }
    assert_eq!(all_blocks(&alloc), vec![(0, 11)]);
}

#[test]
fn rejected_operations() {
    let mut descs = vec![PageDescriptor::INVALID; 64];
    let mut alloc = BuddyAllocator::new();

    assert_eq!(alloc.allocate_pages(0), None);
    assert_eq!(alloc.insert_page_range(Pfn::new(0), 8), Err(Error::Uninitialized));

    alloc.init(PageTable::new(&mut descs, Pfn::new(0))).unwrap();
    alloc.insert_page_range(Pfn::new(0), 32).unwrap();

    assert_eq!(
        alloc.insert_page_range(Pfn::new(60), 8),
        Err(Error::OutOfBounds(Pfn::new(68)))
    );
    assert_eq!(
        alloc.insert_page_range(Pfn::new(28), 8),
        Err(Error::AlreadyAvailable(Pfn::new(28)))
    );
    assert_eq!(alloc.free_pages(Pfn::new(64), 0), Err(Error::OutOfBounds(Pfn::new(64))));
    assert_eq!(alloc.free_pages(Pfn::new(3), 0), Err(Error::NotAllocated(Pfn::new(3))));
    assert_eq!(alloc.allocate_pages(MAX_ORDER + 1), None);
    assert_eq!(alloc.allocate_pages(6), None);
    assert_eq!(alloc.allocate_pages(5), Some(Pfn::new(0)));
}
