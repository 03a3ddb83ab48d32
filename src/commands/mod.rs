//! Command-line command handlers for bugler.
//!
//! One-shot commands that run instead of the controller loop. Each command is
//! implemented in its own submodule.

pub mod help;
pub mod set_time;
pub mod simulate;
pub mod sunset;
