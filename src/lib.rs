//! Street Network Simulation Library
//!
//! Grid-based road building with automatic lane graph discovery and
//! autonomous vehicles, runnable headless.

pub mod simulation;
