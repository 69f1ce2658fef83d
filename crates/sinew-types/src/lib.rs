//! # sinew-types
//!
//! Error type and constants shared by every Sinew crate.
//!
//! This crate has zero domain logic. It defines the vocabulary
//! that all other Sinew crates share.

pub mod constants;
pub mod error;

pub use error::{SinewError, SinewResult};
