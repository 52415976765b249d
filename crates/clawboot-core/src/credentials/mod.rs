//! Identity and credential configuration from mounted descriptors
//!
//! Each configurator reads one optional file from the config directory and
//! applies it to a well-known location: global git config, an exported
//! variable, a credential file or a copied client config. Absent and
//! malformed inputs are skipped without side effects.

pub mod github;
pub mod mail;
pub mod notion;

pub use github::{configure_github, GitHubStatus, GitIdentity};
pub use mail::install_mail_config;
pub use notion::configure_notion;
