//! The `utils` module provides definitions shared across the crate.
//!
//! It holds the failure model every engine call is translated into and the
//! logging setup used by the demo binary and by tests.

pub mod error;
pub mod logging;
