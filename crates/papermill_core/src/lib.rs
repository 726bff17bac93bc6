//! Papermill domain core.
//!
//! Zero internal dependencies so it can be used by the API facade, the
//! store layer, the worker runtime, and any future CLI tooling.

pub mod backend;
pub mod error;
pub mod lifecycle;
pub mod principal;
pub mod types;
