//! Command handlers for uma CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod configure;
pub mod extract;
pub mod installs;
pub mod keys;
pub mod list;
