//! Downloads Shopee Philippines live replays: looks up a session's records,
//! fetches each record's HLS segments and remuxes them into one file with
//! ffmpeg.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod manifest;
pub mod mux;
pub mod picker;
pub mod pipeline;
pub mod report;
pub mod segments;

pub use config::{Config, FailurePolicy};
pub use error::{ReplayError, Result};
pub use input::{ResolvedInput, resolve_input};
pub use mux::{FfmpegMuxer, Muxer};
pub use pipeline::Pipeline;
pub use report::RunReport;
