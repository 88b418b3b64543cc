//! Address and order arithmetic for binary buddy blocks.
//!
//! Every function in here is pure and works on frame numbers relative to the table base,
//! which is always frame `0` once an allocator is initialized.

use crate::page::Pfn;

/// Calculates the number of pages inside a block of the given order.
pub const fn size_for_order(order: usize) -> usize {
    1 << order
}

/// Check if `pfn` is a valid head for a block of the given order.
pub const fn is_aligned(pfn: Pfn, order: usize) -> bool {
    pfn.as_usize() & (size_for_order(order) - 1) == 0
}

/// Calculates the buddy of the `2^order` block at `pfn`.
///
/// If bit `order` of the frame number is set, the buddy lies to the left,
/// otherwise it lies to the right. Returns `None` if the buddy block does not
/// completely fit before `end`.
pub fn buddy_of(pfn: Pfn, order: usize, end: Pfn) -> Option<Pfn> {
    let buddy = Pfn::new(pfn.as_usize() ^ size_for_order(order));
    let buddy_end = buddy.as_usize().checked_add(size_for_order(order))?;

    (buddy_end <= end.as_usize()).then(|| buddy)
}

/// Calculates the smallest order whose block holds at least `count` pages.
pub fn order_for_count(count: usize) -> usize {
    match count {
        0 | 1 => 0,
        n => (usize::BITS - (n - 1).leading_zeros()) as usize,
    }
}

/// Calculates the largest order whose block fits into `count` pages.
///
/// `count` must not be zero.
pub fn floor_order(count: usize) -> usize {
    (usize::BITS - 1 - count.leading_zeros()) as usize
}

/// Find the largest order, but at most `max`, for a block starting at `cursor`
/// that is aligned and ends before `lim`.
///
/// `cursor` must be below `lim`, which makes sure that order `0` always fits.
pub fn largest_fitting_order(cursor: Pfn, lim: Pfn, max: usize) -> usize {
    let align = cursor.as_usize().trailing_zeros() as usize;
    max.min(align).min(floor_order(lim - cursor))
}

/// Recover the order of an allocated block from the bookmark its head carries.
///
/// The bookmark is the frame number of the block's buddy at allocation time, so the
/// distance between both is exactly the block size. Returns `None` if the distance is not
/// a power of two, which means the bookmark was never written by the buddy engine.
pub fn order_from_bookmark(head: Pfn, bookmark: Pfn) -> Option<usize> {
    let distance = if bookmark > head {
        bookmark - head
    } else {
        head - bookmark
    };

    distance
        .is_power_of_two()
        .then(|| distance.trailing_zeros() as usize)
}
