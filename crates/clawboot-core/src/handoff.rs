//! Gateway handoff
//!
//! The gateway is the final, blocking step. Its exit code becomes the
//! bootstrap's own; this is the only failure that reaches the caller.

use crate::{CommandSpec, CoreError, ExecContext};

/// Exit code when the gateway executable cannot be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code when the gateway exists but cannot be started
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// Launch the gateway with the context environment and wait for it
pub async fn handoff(ctx: &ExecContext, argv: &[String]) -> i32 {
    let Some(spec) = CommandSpec::from_argv(argv) else {
        tracing::error!("No gateway command configured");
        return EXIT_NOT_FOUND;
    };

    tracing::info!("Handing off to `{}`", spec);
    match ctx.run_foreground(spec).await {
        Ok(code) => {
            if code == 0 {
                tracing::info!("Gateway exited cleanly");
            } else {
                tracing::warn!("Gateway exited with code {}", code);
            }
            code
        }
        Err(CoreError::Spawn { program, source }) => {
            tracing::error!("Failed to launch gateway {}: {}", program, source);
            if source.kind() == std::io::ErrorKind::NotFound {
                EXIT_NOT_FOUND
            } else {
                EXIT_CANNOT_EXECUTE
            }
        }
        Err(e) => {
            tracing::error!("Gateway failed: {}", e);
            EXIT_CANNOT_EXECUTE
        }
    }
}
