//! Shared test utilities for the h3-importer workspace.
//!
//! This crate provides common testing infrastructure including:
//! - GeoTIFF and GeoJSON fixture writers
//! - Skip macros for tests needing a live database
//! - Grid data generators
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures::GeoTiffSpec, require_database};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Environment variable holding the Postgres URL for database tests.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Macro to skip a test when no test database is configured.
///
/// Database-backed tests are also marked `#[ignore]`; this guard keeps
/// `cargo test -- --ignored` usable on machines without Postgres.
///
/// # Usage
///
/// ```ignore
/// use test_utils::require_database;
///
/// #[tokio::test]
/// #[ignore]
/// async fn test_copy_rows() {
///     let url = require_database!();
///     // Test code using url...
/// }
/// ```
#[macro_export]
macro_rules! require_database {
    () => {{
        match std::env::var($crate::TEST_DATABASE_URL) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                eprintln!(
                    "SKIPPED: {} is not set. Point it at a disposable Postgres database.",
                    $crate::TEST_DATABASE_URL
                );
                return;
            }
        }
    }};
}

/// Assert that two floating point values are approximately equal.
///
/// # Usage
///
/// ```
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0_f64, 1.0001_f64, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        let epsilon = $epsilon;
        let diff = (left - right).abs();
        assert!(
            diff <= epsilon,
            "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > epsilon `{:?}`",
            left,
            right,
            diff,
            epsilon
        );
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq() {
        assert_approx_eq!(1.0_f64, 1.0001_f64, 0.001);
        assert_approx_eq!(0.0_f32, 0.00001_f32, 0.0001);
    }

    #[test]
    #[should_panic]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.0_f64, 2.0_f64, 0.001);
    }
}
