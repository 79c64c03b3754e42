//! Google API Clients
//!
//! Authenticated HTTP access to the Google REST surfaces the tools call:
//! Calendar v3, Gmail v1, Drive v3 and Tasks v1. Each wrapper is constructed
//! per tool call from a fresh bearer token.

pub mod calendar;
pub mod client;
pub mod common;
pub mod drive;
pub mod gmail;
pub mod tasks;

pub use calendar::CalendarApi;
pub use drive::DriveApi;
pub use gmail::GmailApi;
pub use tasks::TasksApi;

/// Implements the standard wrapper constructor: each API struct wraps a
/// `GoogleClient` and provides `new(access_token)`.
macro_rules! google_api_wrapper {
    ($name:ident) => {
        impl $name {
            /// Create a new API client with an OAuth access token
            pub fn new(access_token: String) -> crate::common::Result<Self> {
                let client = crate::google::client::GoogleClient::new(access_token)?;
                Ok(Self { client })
            }
        }
    };
}

pub(crate) use google_api_wrapper;
