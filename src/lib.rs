pub mod error;
pub mod parser;
pub mod rate;
pub mod normalize;
pub mod journey;
pub mod funnel;
pub mod segments;
pub mod cohorts;
pub mod listings;
pub mod temporal;
pub mod payment;
pub mod analyzers;
pub mod output;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use pipeline::{run, PipelineInputs, PipelineOpts, PipelineOutput};

#[cfg(test)]
mod timestamp_tests;
