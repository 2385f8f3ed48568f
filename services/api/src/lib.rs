//! yard allocation service library.
//!
//! This crate primarily ships a `yard-api` binary, but we expose a library
//! surface to enable integration testing and reuse.

pub mod allocation;
pub mod api;
pub mod config;
pub mod model;
pub mod notify;
pub mod state;
pub mod store;
