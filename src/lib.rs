//! Pollserve - single-threaded file streaming server
//!
//! Serves one fixed resource to many clients from a single readiness loop.

pub mod client;
pub mod config;
pub mod server;
pub mod transfer;
