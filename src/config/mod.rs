// src/config/mod.rs

//! Configuration loading and validation for nac-runner.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate value ranges (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    AuthSection, BatchSection, HttpSection, OutputSection, RawRunnerConfig, RunnerConfig,
    RunnerSection, StreamSection,
};
