//! Bluelist: page through Bluesky follows and lists, manage list membership,
//! and ask a language model how followed profiles fit existing lists.

pub mod app;
pub mod auth;
pub mod bsky;
pub mod cli;
pub mod config;
pub mod errors;
pub mod lists;
pub mod llm;
pub mod paging;
pub mod suggestions;
pub mod utils;
pub mod version;
