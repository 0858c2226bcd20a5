//! Core types, config, and errors for Inkroom.

pub mod config;
pub mod error;
pub mod protocol;
