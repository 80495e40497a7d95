pub mod actions;
pub mod config;
pub mod error;
/// Request-time credential and permission-drift check.
pub mod guard;
pub mod password;
pub mod permissions;
pub mod server;
pub mod service;
pub mod store;
pub mod token;
