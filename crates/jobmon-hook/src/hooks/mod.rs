//! Built-in hooks shipped with the host.

pub mod log;
pub mod rest;
