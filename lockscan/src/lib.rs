//! Find the processes that hold immutable files open.
//!
//! A run is a point-in-time snapshot in two stages: the scanner builds the
//! set of files carrying the immutable attribute, then the correlator walks
//! every live process and intersects its open descriptors with that set.

pub mod config;
pub mod data;
pub mod error;
pub mod output;
pub mod privilege;

pub use lockscan_common::{Finding, ImmutableFileSet, Pid, ProcessRecord};
