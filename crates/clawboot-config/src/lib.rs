//! Configuration parsing for clawboot
//!
//! This crate handles parsing of:
//! - Bootstrap settings (`~/.config/clawboot/config.toml`)
//! - JSON config descriptors mounted into the container config directory

mod descriptor;
mod error;
mod settings;

pub use descriptor::*;
pub use error::*;
pub use settings::*;
