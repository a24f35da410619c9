//! # Cascade
//!
//! Lazy, chainable sequence-processing pipelines for Rust, in two parallel
//! flavors: [`Sequence`] pulls synchronously, [`AsyncSequence`] may suspend
//! at every pull.
//!
//! A pipeline is a chain of operator stages rooted at a source. Building a
//! stage costs nothing and runs no user code; the terminal operations
//! (`to_vec`, `sum`, `first`, ...) open a fresh cursor chain and pull one
//! element at a time through every stage. Consuming a pipeline twice re-runs
//! it from the source.
//!
//! ## Features
//!
//! - **Deferred everything**: operators build pipeline nodes; only terminals
//!   evaluate, and early-terminating terminals never over-pull the source
//! - **One semantics, two runtimes**: the async operators mirror the sync
//!   ones stage for stage, including index counting and error propagation
//! - **Named strategies**: stages are configured with per-family strategy
//!   objects ([`strategy`]) instead of captured closures
//! - **Uniform error taxonomy**: everything a pipeline can raise derives
//!   from [`Error`], with foreign errors wrapped exactly once
//! - **Opt-in bounds guarding**: a pipeline-wide [`PipelineConfig`] turns
//!   silent wrapping of counters and sums into overflow errors
//!
//! ## Quick Start
//!
//! ```rust
//! use cascade::prelude::*;
//!
//! # fn main() -> cascade::Result<()> {
//! let names = Sequence::from_vec(vec!["ada", "grace", "alan", "edsger"]);
//!
//! let initials = names
//!     .filter(predicate(|name: &&str, _| name.len() > 3))
//!     .map(mapper(|name: &str, _| name.to_uppercase()));
//!
//! assert_eq!(initials.to_vec()?, vec!["GRACE", "ALAN", "EDSGER"]);
//! # Ok(())
//! # }
//! ```
//!
//! The async flavor reads the same, with `.await` at the terminals:
//!
//! ```rust,ignore
//! use cascade::prelude::*;
//!
//! let totals = AsyncSequence::from_stream(readings)
//!     .filter(predicate(|r: &Reading, _| r.valid))
//!     .map(mapper(|r: Reading, _| r.value));
//! let sum = totals.sum().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod numeric;
pub mod pair;
pub mod seq;
pub mod strategy;
pub mod stream;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::{Error, Result};
    pub use crate::pair::Pair;
    pub use crate::seq::Sequence;
    pub use crate::strategy::{
        async_mapper, async_predicate, async_reducer, async_selector, boundary, comparator,
        identity, mapper, predicate, reducer, selector, try_mapper, try_predicate, try_reducer,
    };
    pub use crate::stream::AsyncSequence;
}

pub use config::{PipelineConfig, DEFAULT_REVERSE_BLOCK};
pub use error::{BoxError, Error, Result};
pub use numeric::Numeric;
pub use pair::Pair;
pub use seq::{Iter, Sequence};
pub use stream::AsyncSequence;
