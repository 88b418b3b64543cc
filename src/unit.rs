//! Utilities for pretty-printing byte and page counts.

use crate::page::PAGE_SIZE;
use core::fmt;

/// `1 KiB`
pub const KIB: u64 = 1 << 10;
/// `1 MiB`
pub const MIB: u64 = 1 << 20;
/// `1 GiB`
pub const GIB: u64 = 1 << 30;
/// `1 TiB`
pub const TIB: u64 = 1 << 40;

/// Wrapper around raw bytes that pretty-prints
/// them using the [`Display`](core::fmt::Display)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteUnit(pub u64);

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0 as f64;

        match self.0 {
            n if n < KIB => write!(f, "{} B", n),
            n if n < MIB => write!(f, "{:.2} KiB", count / KIB as f64),
            n if n < GIB => write!(f, "{:.2} MiB", count / MIB as f64),
            n if n < TIB => write!(f, "{:.2} GiB", count / GIB as f64),
            _ => write!(f, "{:.2} TiB", count / TIB as f64),
        }
    }
}

/// Display the number of bytes inside `count` pages.
pub fn pages(count: usize) -> ByteUnit {
    ByteUnit(count as u64 * PAGE_SIZE as u64)
}
