//! Notes service API key export

use crate::ExecContext;
use clawboot_config::{Descriptor, FieldPath};
use std::path::Path;

const API_KEY_FIELDS: &[FieldPath<'static>] = &[&["apiKey"]];

/// Export the descriptor's `apiKey` as `env_var`. Returns whether it was exported.
pub fn configure_notion(ctx: &mut ExecContext, descriptor_path: &Path, env_var: &str) -> bool {
    let Some(api_key) = Descriptor::load(descriptor_path).and_then(|d| d.lookup(API_KEY_FIELDS))
    else {
        return false;
    };

    ctx.set_env(env_var, api_key);
    tracing::info!("Notion API key configured in environment variable {}", env_var);
    true
}
