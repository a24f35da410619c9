//! Error types for Cascade.

use thiserror::Error;

/// Result type alias using Cascade's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type accepted at the foreign-error boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for Cascade operations.
///
/// Every failure a pipeline can surface is one of these variants, so callers
/// that match on `cascade::Error` are guaranteed to cover everything the
/// library throws. Foreign errors raised inside user strategies are wrapped
/// exactly once into [`Error::Unexpected`] at the point where they enter the
/// pipeline; library errors are never re-wrapped.
#[derive(Error, Debug)]
pub enum Error {
    /// A required single match was absent.
    #[error("no matching element: {0}")]
    ItemNotFound(&'static str),

    /// A sole-style operation saw a second match.
    #[error("more than one matching element: {0}")]
    MultipleItemsFound(&'static str),

    /// A runtime contract of the operation was violated by the input.
    #[error("invalid input for operation: {0}")]
    InvalidType(&'static str),

    /// A guarded counter or accumulator would exceed the representable maximum.
    #[error("numeric overflow in {0}")]
    NumericOverflow(&'static str),

    /// A guarded accumulator would fall below the representable minimum.
    #[error("numeric underflow in {0}")]
    NumericUnderflow(&'static str),

    /// The operation is declared but has no behavior yet.
    #[error("operation not implemented: {0}")]
    Unimplemented(&'static str),

    /// Catch-all wrapping a non-library error, preserving it as the cause.
    #[error("unexpected error: {source}")]
    Unexpected {
        /// The original foreign error.
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wrap a foreign error, unless it already is a library error.
    ///
    /// This is the single exception-translation boundary: a boxed
    /// [`Error`] passes through unchanged, anything else becomes
    /// [`Error::Unexpected`] with the original attached as its cause.
    /// Applying it twice never double-wraps.
    pub fn unexpected(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        match err.downcast::<Error>() {
            Ok(own) => *own,
            Err(err) => Error::Unexpected { source: err },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskOnFire;

    #[test]
    fn test_foreign_error_is_wrapped_once() {
        let wrapped = Error::unexpected(DiskOnFire);
        match &wrapped {
            Error::Unexpected { source } => {
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }

        // Re-entering the boundary must not add a second layer.
        let rewrapped = Error::unexpected(wrapped);
        match rewrapped {
            Error::Unexpected { source } => {
                assert!(source.downcast_ref::<DiskOnFire>().is_some());
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[test]
    fn test_library_error_passes_through() {
        let err = Error::unexpected(Error::ItemNotFound("sole"));
        assert!(matches!(err, Error::ItemNotFound("sole")));
    }
}
