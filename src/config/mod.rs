// src/config/mod.rs

//! Request configuration for driverdag.
//!
//! Responsibilities:
//! - Define the TOML-backed request file (`model.rs`).
//! - Validate it (`validate.rs`).
//! - Discover inputs from globs (`inputs.rs`).
//! - Load it and resolve it into a [`BuildRequest`] (`loader.rs`).

pub mod inputs;
pub mod loader;
pub mod model;
pub mod request;
pub mod validate;

pub use inputs::{discover_inputs, InputPatterns};
pub use loader::{
    default_request_path, load_and_validate, load_from_path, request_root, resolve_request,
    RequestOverrides,
};
pub use model::{BuildSection, InputsSection, RawRequestFile, RequestFile, ToolsSection};
pub use request::{BuildRequest, InputFile, Toolchain};
