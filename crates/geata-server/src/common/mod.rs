//! Shared infrastructure used across the server.

pub mod error;

pub use error::{Error, Result};
