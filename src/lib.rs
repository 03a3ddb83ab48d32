//! # Bugler Library
//!
//! Internal library for the bugler binary: a daily bugle-call controller.
//!
//! This library exists to enable testing of the controller internals and to
//! keep CLI dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: `Bugler` builder acquires resources and starts the loop
//! - **Core Logic**: `core` module contains the polling loop
//! - **Time**: `time` module with the clock authority, DST rules, RTC and SNTP
//! - **Scheduling**: `sunset` dataset lookup and the day-scoped `scheduler`
//! - **Actuators**: `actuator` module with serial, recorder and in-memory sinks
//! - **Configuration**: `config` module for TOML-based settings
//! - **Commands**: `commands` module for `set-time`, `sunset` and `simulate`
//! - **Infrastructure**: signal handling, lock file, logging and utilities

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod actuator;
pub mod args;
pub mod commands;
pub mod common;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod scheduler;
pub mod sunset;
pub mod time;

mod bugler;

pub use bugler::Bugler;
pub use error::{DatasetError, TimeError};
