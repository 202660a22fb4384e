//! Quill Shared Types
//!
//! Notification types and errors shared by the Quill notification client.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
