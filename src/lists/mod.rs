//! List membership and list management
//!
//! Writes go through [`RepoApi`](crate::bsky::RepoApi); the duplicate check
//! before an add reads through [`GraphApi`](crate::bsky::GraphApi).

mod manage;
mod membership;

pub use manage::*;
pub use membership::*;
