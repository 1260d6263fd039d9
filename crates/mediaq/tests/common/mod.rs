//! Shared test utilities for mediaq integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated queue/output/database roots
//! - `ScriptedRunner`, a `ToolRunner` that records invocations instead of
//!   spawning ffmpeg, ffprobe or heif-convert

pub mod harness;
pub mod runner;

pub use harness::{drain_until_idle, TestHarness};
pub use runner::{probe_json, ScriptedRunner};
