//! Relay bot for a Signal messaging daemon.

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod forwarding;
pub mod logging;
pub mod session;
