//! Debouncing of polled inputs.

mod edge;

pub use edge::*;
