//! Loading `DuetConfig` from TOML.
//!
//! An explicit path must exist. The platform default path is created with
//! a commented template on first use. A file that parses but fails
//! validation yields the defaults plus a warning.

mod loader;
mod paths;
mod template;


pub use loader::{load_default, load_from_path};
pub use paths::{create_default_config, default_config_path};
