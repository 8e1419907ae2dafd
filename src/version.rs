//! Version information, taken from Cargo.toml at build time

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get the full version string
pub fn full_version() -> String {
    format!("{} v{}", APP_NAME, VERSION)
}

/// User agent sent with every HTTP request
pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME, VERSION)
}
