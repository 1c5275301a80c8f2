//! Execution Module
//!
//! Safe, logged, reversible file placement.

pub mod executor;

pub use executor::*;
