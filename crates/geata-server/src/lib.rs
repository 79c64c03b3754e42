//! Geata: Google Workspace bridge speaking the Model Context Protocol
//!
//! Exposes Calendar, Gmail, Drive and Tasks as MCP tools over stdio or a
//! local TCP socket. Authenticates with either a service-account key or an
//! interactive OAuth consent flow.

pub mod auth;
pub mod common;
pub mod config;
pub mod google;
pub mod schedule;
pub mod server;
pub mod tools;
