//! Snapshot, plan and apply Microsoft 365 user offboarding.
//!
//! A run resolves the leaver, captures a Before-snapshot across Graph,
//! Exchange Online and (optionally) on-premises AD, builds a plan, applies it
//! when asked to, captures an After-snapshot and renders ticket work notes.

pub mod access;
pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod onprem;
pub mod services;
pub mod transcript;

pub use error::{Error, Offboard365Error, Result};
