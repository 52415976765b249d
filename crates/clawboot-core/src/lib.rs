//! Core logic for the clawboot container bootstrap
//!
//! This crate provides:
//! - Permission normalization for the mounted config directory
//! - SSH agent startup, key enrollment, known_hosts seeding and probing
//! - Git/GitHub identity, Notion key and mail config installation
//! - Command execution through a swappable runner
//! - The final handoff to the gateway process

mod bootstrap;
pub mod credentials;
mod error;
mod exec;
mod handoff;
mod permissions;
mod ssh;

pub use bootstrap::*;
pub use error::*;
pub use exec::*;
pub use handoff::*;
pub use permissions::*;
pub use ssh::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
