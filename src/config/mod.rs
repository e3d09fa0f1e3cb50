// src/config/mod.rs

//! Configuration: CLI flags merged over an optional `Transmirror.toml`,
//! then validated.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, resolve, resolve_with};
pub use model::{FileConfig, MirrorConfig, CONFIG_FILE_NAME};
pub use validate::validate;
