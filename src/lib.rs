//! Simple to use cli/daemon for tracking how long you work and whether you hit your daily
//! targets. Unlike other solutions this doesn't require any runtimes, is quite lightweight, and
//! can be easily used through a terminal.
//!

pub mod cli;
pub mod daemon;
pub mod engine;
pub mod settings;
pub mod stats;
pub mod store;
pub mod system;
pub mod utils;
