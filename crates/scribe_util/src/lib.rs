//! Common utilities shared across the `scribe` subcrates. Not for external
//! use.
//!
//! **This crate is not semver compliant**. The version is locked to the root
//! `scribe` crate version. If you choose to depend directly on this crate,
//! you do so at your own risk of breakage.

#[cfg(any(test, feature = "test"))]
mod test_util;

#[cfg(any(test, feature = "test"))]
pub use test_util::*;

use std::ops::Deref;
use tracing::error;

/// Extension trait for [anyhow::Result], so an error can be traced (logged)
/// at the point it's produced without losing it to the caller.
pub trait ResultTraced<T>: Sized {
    /// If this is an error, trace it. Return the same result.
    #[must_use]
    fn traced(self) -> Self;
}

impl<T> ResultTraced<T> for anyhow::Result<T> {
    fn traced(self) -> Self {
        self.inspect_err(|err| error!(error = err.deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traced_passes_through_ok() {
        let result: anyhow::Result<i32> = Ok(5).traced();
        assert_eq!(result.unwrap(), 5);
    }

    #[test]
    fn test_traced_passes_through_err() {
        let result: anyhow::Result<i32> = Err(anyhow::anyhow!("boom")).traced();
        assert!(result.is_err());
    }
}
