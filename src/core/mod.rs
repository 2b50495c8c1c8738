//! Core scheduling abstractions: jobs, timers, clocks and identifiers.

pub mod job;
pub mod schedule;
pub mod timer;
pub mod types;
