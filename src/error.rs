//! Error taxonomy for the pipeline
//!
//! Four classes per the design notes, but only two get a dedicated enum
//! variant: configuration errors fail bootstrap, and programmer errors
//! (unsupported sample rate, non-mono audio, unsupported WAV width) are
//! never expected at steady state and panic at the boundary that detects
//! them. Transient external errors and transport-fatal conditions are
//! handled structurally inside each stage's own `run()` loop (a retry over
//! a plain `anyhow::Result`, or setting `ExitFlag`) rather than through a
//! typed value, so they have no variant here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}
