//! Robot controller integration.
//!
//! # Responsibility
//! - Hold the calibrated pose table used by generated programs.
//! - Generate controller scripts for pick/sort motion programs.
//! - Transmit scripts and dashboard directives over TCP.
//!
//! # Invariants
//! - Script generation is pure: identical inputs give byte-identical output.
//! - The link never reads controller responses and never retries.

pub mod link;
pub mod pose;
pub mod script;
