//! Library half of the `rankpart` binary: config file handling and logging
//! setup, split out so they can be tested without spawning the CLI.

pub mod config;
pub mod logging;
