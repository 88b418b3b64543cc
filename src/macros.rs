//! Macros that are used throughout the allocators.

/// Reports a broken allocator invariant and aborts.
///
/// The free lists can not be trusted anymore once this fires, so the message is logged
/// with a `FATAL` marker and the kernel panics right after.
macro_rules! fatal {
    ($($args:tt)+) => {{
        ::log::error!("FATAL: {}", ::core::format_args!($($args)+));
        ::core::panic!($($args)+)
    }};
}
