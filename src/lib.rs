// Library root, exposes the pipeline for integration tests.
// The binary entry point is src/main.rs.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod identity;
pub mod logger;
pub mod server_config;
pub mod system;
