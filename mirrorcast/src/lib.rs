//! # mirrorcast
//!
//! Sender and receiver front end for `mirrorcast-core`: command line,
//! TOML configuration and the native receiver window.

pub mod cli;
pub mod config;
pub mod display;
pub mod window;
