//! Step-sequenced extraction pipeline.
//!
//! A [`Runner`] drives an ordered list of [`Step`]s over one [`Context`].
//! Steps return a [`Signal`]; the first stop signal ends the run.

pub mod context;
pub mod runner;
pub mod step;
pub mod steps;

pub use context::Context;
pub use runner::{PipelineOutcome, Runner};
pub use step::{Signal, Step};
