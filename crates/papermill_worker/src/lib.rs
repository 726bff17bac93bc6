//! Papermill worker runtime.
//!
//! One long-lived process per machine; inside it, one [`worker::Worker`]
//! task per GPU slot pulls work from the shared task store, invokes the
//! engine adapter for the task's backend, and reports the outcome back.

pub mod config;
pub mod engine;
pub mod health;
pub mod worker;
