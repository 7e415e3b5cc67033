//! # Utilities Module
//!
//! Cross-cutting numeric helpers shared by the model layer.

pub mod math;
