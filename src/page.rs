//! The page descriptor table that is shared between the kernel and the page allocators.

use crate::mem::{free_list::ListId, Error, Result};
use core::{fmt, ops};

/// The number of bits inside a page offset.
pub const PAGE_BITS: usize = 12;

/// The size of a single page in memory.
///
/// This is also the size of an order `0` block inside the buddy allocator.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

macro_rules! frame_type {
    ($(#[$attr:meta])* $pub:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $pub struct $name(usize);

        impl $name {
            /// Create a new frame number from the raw index.
            pub const fn new(raw: usize) -> Self {
                Self(raw)
            }

            /// Return the raw index of this frame number.
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Return the physical address of the first byte inside this frame.
            pub const fn phys_addr(self) -> usize {
                self.0 << PAGE_BITS
            }
        }

        impl From<usize> for $name {
            fn from(raw: usize) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for usize {
            fn from(x: $name) -> usize {
                x.0
            }
        }

        impl ops::Add<usize> for $name {
            type Output = $name;

            fn add(self, count: usize) -> $name {
                $name(self.0 + count)
            }
        }

        impl ops::Sub<usize> for $name {
            type Output = $name;

            fn sub(self, count: usize) -> $name {
                $name(self.0 - count)
            }
        }

        /// The number of frames between two frame numbers.
        impl ops::Sub<$name> for $name {
            type Output = usize;

            fn sub(self, other: $name) -> usize {
                self.0 - other.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

frame_type! {
    /// A page frame number, the index of a physical page inside the descriptor table.
    pub struct Pfn;
}

/// The state of a single physical page frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// The frame is part of a free block and can be handed out.
    Available,
    /// The frame is part of a block that was handed out by an allocator.
    Allocated,
    /// The frame is permanently taken away from the allocators, e.g. by the kernel image.
    Reserved,
    /// The frame was never given to an allocator.
    Invalid,
}

/// Metadata for a single physical page frame.
///
/// Only the first descriptor of a block, its head, carries meaningful links. While a block
/// is free, `free_prev` and `free_next` link the head into the free list of its size. While
/// a block is allocated, one of them holds a bookmark that lets the allocator recover the
/// size of the block once it is freed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    pub(crate) status: PageStatus,
    pub(crate) free_prev: Option<Pfn>,
    pub(crate) free_next: Option<Pfn>,
    /// The free list this descriptor is currently linked into, if it heads a free block.
    pub(crate) list: Option<ListId>,
}

impl PageDescriptor {
    /// A descriptor for a frame that was never given to an allocator.
    pub const INVALID: PageDescriptor = PageDescriptor::new(PageStatus::Invalid);

    /// A descriptor for a frame that is taken by the kernel itself.
    pub const RESERVED: PageDescriptor = PageDescriptor::new(PageStatus::Reserved);

    /// Create an unlinked descriptor with the given status.
    pub const fn new(status: PageStatus) -> Self {
        Self {
            status,
            free_prev: None,
            free_next: None,
            list: None,
        }
    }

    /// The current status of this frame.
    pub fn status(&self) -> PageStatus {
        self.status
    }

    /// Check if this frame is part of a free block.
    pub fn is_available(&self) -> bool {
        self.status == PageStatus::Available
    }

    /// Check if this descriptor heads a block inside any free list.
    pub fn is_free_head(&self) -> bool {
        self.list.is_some()
    }

    /// Reset the links of this descriptor and give it the new status.
    pub(crate) fn reset(&mut self, status: PageStatus) {
        *self = PageDescriptor::new(status);
    }
}

/// The table of page descriptors, one for every physical page frame.
///
/// The table itself is owned by the kernel and only borrowed by the allocator for its
/// whole lifetime.
pub struct PageTable<'t> {
    descriptors: &'t mut [PageDescriptor],
    base: Pfn,
}

impl<'t> PageTable<'t> {
    /// Create a table view over `descriptors`, where the first descriptor describes the
    /// frame `base`.
    pub fn new(descriptors: &'t mut [PageDescriptor], base: Pfn) -> Self {
        Self { descriptors, base }
    }

    /// The number of descriptors inside this table.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if this table describes no frames at all.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The frame number of the first descriptor.
    pub fn base(&self) -> Pfn {
        self.base
    }

    /// The frame number right after the last descriptor.
    pub fn end(&self) -> Pfn {
        self.base + self.len()
    }

    /// Map the descriptor at the given table index to its page frame number.
    pub fn pgd_to_pfn(&self, index: usize) -> Pfn {
        self.base + index
    }

    /// Check if the given frame is described by this table.
    pub fn contains(&self, pfn: Pfn) -> bool {
        self.base <= pfn && pfn < self.end()
    }

    /// Return the descriptor of the given frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not part of this table.
    pub fn descriptor(&self, pfn: Pfn) -> &PageDescriptor {
        &self.descriptors[pfn - self.base]
    }

    pub(crate) fn descriptor_mut(&mut self, pfn: Pfn) -> &mut PageDescriptor {
        &mut self.descriptors[pfn - self.base]
    }

    /// Return all descriptors of the range `start..start + count`.
    pub fn range(&self, start: Pfn, count: usize) -> &[PageDescriptor] {
        let start = start - self.base;
        &self.descriptors[start..start + count]
    }

    /// Set the status of every frame in `start..start + count` and drop their links.
    pub(crate) fn mark(&mut self, start: Pfn, count: usize, status: PageStatus) {
        let start = start - self.base;
        self.descriptors[start..start + count]
            .iter_mut()
            .for_each(|desc| desc.reset(status));
    }

    /// Count the frames that currently have the given status.
    pub fn count(&self, status: PageStatus) -> usize {
        self.descriptors
            .iter()
            .filter(|desc| desc.status == status)
            .count()
    }

    /// Check that `start..start + count` lies inside this table.
    ///
    /// Returns the frame right after the range.
    pub fn check_range(&self, start: Pfn, count: usize) -> Result<Pfn> {
        let end = start
            .as_usize()
            .checked_add(count)
            .map(Pfn::new)
            .ok_or(Error::OutOfBounds(start))?;

        if start < self.base || end > self.end() {
            return Err(Error::OutOfBounds(end));
        }

        Ok(end)
    }

    /// Check that every frame inside `start..start + count` is untouched or reserved,
    /// so it can be handed to an allocator.
    pub(crate) fn check_insertable(&self, start: Pfn, count: usize) -> Result<()> {
        let taken = self.range(start, count).iter().enumerate().find(|(_, desc)| {
            matches!(desc.status, PageStatus::Available | PageStatus::Allocated)
        });

        match taken {
            Some((idx, desc)) if desc.is_available() => Err(Error::AlreadyAvailable(start + idx)),
            Some((idx, _)) => Err(Error::InUse(start + idx)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PageTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTable")
            .field("base", &self.base)
            .field("len", &self.len())
            .finish()
    }
}
