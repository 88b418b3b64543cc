//! Fibonacci arithmetic for the Fibonacci buddy engine.
//!
//! The sequence used here starts with `fib(0) = fib(1) = 1`, so the terms are
//! `1, 1, 2, 3, 5, 8, 13, ...` and every block of size `fib(i)` splits into the blocks
//! `fib(i - 2)` and `fib(i - 1)`.

/// The largest index whose Fibonacci term still fits into an `u64`
/// without overflowing in any intermediate product.
pub const MAX_FIB_INDEX: usize = 90;

/// A 2x2 matrix used for the fast exponentiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Matrix([[u64; 2]; 2]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([[1, 0], [0, 1]]);

    /// `[[1, 1], [1, 0]]^n` is `[[F(n + 1), F(n)], [F(n), F(n - 1)]]`.
    const STEP: Matrix = Matrix([[1, 1], [1, 0]]);

    fn mul(self, rhs: Matrix) -> Matrix {
        let [[a, b], [c, d]] = self.0;
        let [[e, f], [g, h]] = rhs.0;

        Matrix([
            [a * e + b * g, a * f + b * h],
            [c * e + d * g, c * f + d * h],
        ])
    }
}

/// Calculate the Fibonacci term at `idx`.
///
/// The step matrix is squared once for every bit of `idx`, and the powers for the set
/// bits are multiplied together, which takes `O(log idx)` multiplications.
///
/// # Panics
///
/// Panics if `idx` is larger than [`MAX_FIB_INDEX`].
pub fn idx_to_fib(idx: usize) -> u64 {
    assert!(
        idx <= MAX_FIB_INDEX,
        "Fibonacci index {} is larger than {}",
        idx,
        MAX_FIB_INDEX
    );

    let mut result = Matrix::IDENTITY;
    let mut power = Matrix::STEP;
    let mut rest = idx;

    while rest > 0 {
        if rest & 1 == 1 {
            result = result.mul(power);
        }

        rest >>= 1;
        if rest > 0 {
            power = power.mul(power);
        }
    }

    // with our offset, `fib(idx)` is `F(idx + 1)`
    result.0[0][0]
}

/// Find the index of the Fibonacci term `value`.
///
/// Returns `None` if `value` is not part of the sequence. For `1`, the index `1` is
/// returned.
pub fn fib_to_idx(value: u64) -> Option<usize> {
    let idx = floor_idx(value)?;
    (idx_to_fib(idx) == value).then(|| idx)
}

/// Find the largest index whose term is at most `value`.
///
/// Returns `None` for `0`, which is smaller than every term.
pub fn floor_idx(value: u64) -> Option<usize> {
    if value == 0 {
        return None;
    }

    // gallop to find an upper bound for the search
    let mut hi = 1;
    while hi < MAX_FIB_INDEX && idx_to_fib(hi) <= value {
        hi = (hi * 2).min(MAX_FIB_INDEX);
    }

    if idx_to_fib(hi) <= value {
        return Some(hi);
    }

    // binary search inside `lo..hi`, `fib(lo) <= value < fib(hi)` holds the whole time
    let mut lo = (hi / 2).max(1);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if idx_to_fib(mid) <= value {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Some(lo)
}

/// Find the smallest index whose term is at least `value`.
///
/// Returns `None` if `value` is larger than the term at [`MAX_FIB_INDEX`].
pub fn ceil_idx(value: u64) -> Option<usize> {
    match floor_idx(value) {
        None => Some(0),
        Some(idx) if idx_to_fib(idx) == value => Some(if value == 1 { 0 } else { idx }),
        Some(idx) if idx < MAX_FIB_INDEX => Some(idx + 1),
        Some(_) => None,
    }
}

/// Calculate the smallest Fibonacci term that is at least `count`.
///
/// Returns `None` if `count` is larger than the term at [`MAX_FIB_INDEX`].
pub fn count_to_fib_ceil(count: u64) -> Option<u64> {
    ceil_idx(count).map(idx_to_fib)
}

/// Calculate the smallest Fibonacci term that holds a `2^order` page block.
pub fn order_to_fib_ceil(order: usize) -> Option<u64> {
    if order >= 64 {
        return None;
    }
    count_to_fib_ceil(1 << order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(idx: usize) -> u64 {
        let (mut a, mut b) = (1u64, 1u64);
        for _ in 0..idx {
            let next = a + b;
            a = b;
            b = next;
        }
        a
    }

    #[test]
    fn terms() {
        let first = [1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];
        for (idx, &term) in first.iter().enumerate() {
            assert_eq!(idx_to_fib(idx), term, "fib({})", idx);
        }

        for idx in 0..=MAX_FIB_INDEX {
            assert_eq!(idx_to_fib(idx), naive(idx), "fib({})", idx);
        }
        assert_eq!(idx_to_fib(MAX_FIB_INDEX), 4_660_046_610_375_530_309);
    }

    #[test]
    #[should_panic]
    fn index_too_large() {
        idx_to_fib(MAX_FIB_INDEX + 1);
    }

    #[test]
    fn inverse() {
        assert_eq!(fib_to_idx(0), None);
        assert_eq!(fib_to_idx(1), Some(1));
        assert_eq!(fib_to_idx(2), Some(2));
        assert_eq!(fib_to_idx(8), Some(5));
        assert_eq!(fib_to_idx(9), None);
        assert_eq!(fib_to_idx(4), None);

        for idx in 2..=MAX_FIB_INDEX {
            assert_eq!(fib_to_idx(idx_to_fib(idx)), Some(idx));
        }
    }

    #[test]
    fn floor_and_ceil() {
        assert_eq!(floor_idx(0), None);
        assert_eq!(floor_idx(1), Some(1));
        assert_eq!(floor_idx(4), Some(3));
        assert_eq!(floor_idx(100), Some(10));
        assert_eq!(floor_idx(u64::MAX), Some(MAX_FIB_INDEX));

        assert_eq!(ceil_idx(0), Some(0));
        assert_eq!(ceil_idx(1), Some(0));
        assert_eq!(ceil_idx(4), Some(4));
        assert_eq!(ceil_idx(5), Some(4));
        assert_eq!(ceil_idx(u64::MAX), None);
    }

    #[test]
    fn ceilings() {
        assert_eq!(count_to_fib_ceil(0), Some(1));
        assert_eq!(count_to_fib_ceil(1), Some(1));
        assert_eq!(count_to_fib_ceil(4), Some(5));
        assert_eq!(count_to_fib_ceil(14), Some(21));

        assert_eq!(order_to_fib_ceil(0), Some(1));
        assert_eq!(order_to_fib_ceil(1), Some(2));
        assert_eq!(order_to_fib_ceil(2), Some(5));
        assert_eq!(order_to_fib_ceil(3), Some(8));
        assert_eq!(order_to_fib_ceil(4), Some(21));
        assert_eq!(order_to_fib_ceil(64), None);
    }

    #[test]
    fn zeckendorf_split() {
        // a block of 8 pages splits into 3 and 5 pages
        let idx = fib_to_idx(order_to_fib_ceil(3).unwrap()).unwrap();
        assert_eq!(idx_to_fib(idx), 8);
        assert_eq!(idx_to_fib(idx - 2), 3);
        assert_eq!(idx_to_fib(idx - 1), 5);

        for idx in 2..=MAX_FIB_INDEX {
            assert_eq!(idx_to_fib(idx), idx_to_fib(idx - 1) + idx_to_fib(idx - 2));
        }
    }
}
