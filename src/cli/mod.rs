mod browse;
mod render;
mod root;

pub use browse::{BrowseCommand, BrowseTarget};
pub use root::Cli;
