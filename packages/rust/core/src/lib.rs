//! Run orchestration for FeedBuilder.
//!
//! This crate ties together fetching, extraction, selection and publishing
//! into a single end-to-end run ([`run_feed`]).

pub mod pipeline;

pub use pipeline::{
    ProgressReporter, RunConfig, RunResult, SilentProgress, record_failure, run_feed,
};
