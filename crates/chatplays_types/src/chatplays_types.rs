//! Chatplays Types - Shared data definitions
//!
//! This crate contains the pure data structures that cross the boundary
//! between the engine, plugin scripts and outside collaborators (UI mirrors,
//! actuator drivers, persisted plugin configuration files).

mod action;
mod event;
mod options;
mod plugin_config;

pub use action::*;
pub use event::*;
pub use options::*;
pub use plugin_config::*;
