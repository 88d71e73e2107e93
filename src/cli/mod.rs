//! Command-line interface for the native host.
//!
//! Browsers launch the host with their own positional arguments, so parsing
//! is lenient: anything unrecognised falls back to running a session.

pub mod args;

pub use args::{Cli, Mode};
