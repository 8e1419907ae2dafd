//! Shared helpers

pub mod json_file;
pub mod retry;
pub mod slug;
