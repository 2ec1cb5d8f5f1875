//! Leveled assertions. The check level is fixed at compile time: higher levels
//! enable progressively more expensive consistency checks and are meant for
//! debugging the engine rather than production runs.

#![allow(unused, reason = "assertion levels above the default are off by default")]

pub const KABOCHA_ASSERT_LEVEL_DISABLED: u8 = 0;
pub const KABOCHA_ASSERT_LEVEL_SIMPLE: u8 = 1;
pub const KABOCHA_ASSERT_LEVEL_MODERATE: u8 = 2;
pub const KABOCHA_ASSERT_LEVEL_ADVANCED: u8 = 3;

#[cfg(feature = "debug-checks")]
pub const KABOCHA_ASSERT_LEVEL_DEFINITION: u8 = KABOCHA_ASSERT_LEVEL_MODERATE;

#[cfg(not(feature = "debug-checks"))]
pub const KABOCHA_ASSERT_LEVEL_DEFINITION: u8 = KABOCHA_ASSERT_LEVEL_SIMPLE;

/// Cheap sanity checks which are always worth keeping on.
#[macro_export]
macro_rules! kabocha_assert_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::KABOCHA_ASSERT_LEVEL_DEFINITION
            >= $crate::asserts::KABOCHA_ASSERT_LEVEL_SIMPLE
        {
            assert!($($arg)*);
        }
    };
}

/// Checks with a visible but acceptable cost, enabled with `debug-checks`.
#[macro_export]
macro_rules! kabocha_assert_moderate {
    ($($arg:tt)*) => {
        if $crate::asserts::KABOCHA_ASSERT_LEVEL_DEFINITION
            >= $crate::asserts::KABOCHA_ASSERT_LEVEL_MODERATE
        {
            assert!($($arg)*);
        }
    };
}

/// Expensive checks (full rescans of engine state); never on by default.
#[macro_export]
macro_rules! kabocha_assert_advanced {
    ($($arg:tt)*) => {
        if $crate::asserts::KABOCHA_ASSERT_LEVEL_DEFINITION
            >= $crate::asserts::KABOCHA_ASSERT_LEVEL_ADVANCED
        {
            assert!($($arg)*);
        }
    };
}
