#![forbid(unsafe_code)]

//! Display output layout persistence and reconciliation.
//!
//! Stored layouts are keyed by the set of connected outputs. When the hardware
//! changes, the matching layout is read back onto the live outputs, modes are
//! resolved, positions corrected for changed geometry and the result handed to
//! the display backend.

pub mod backend;
pub mod constants;
pub mod control;
pub mod daemon;
pub mod geometry;
pub mod matcher;
pub mod mode;
pub mod output;
pub mod rotation;
pub mod store;
pub mod types;
