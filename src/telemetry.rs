use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging for a shopflow session.
///
/// Logs go to stderr so the CLI's own output stays clean on stdout. The
/// filter honors `RUST_LOG`, falling back to the configured default level.
pub fn init_telemetry(default_level: &str, json_logs: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(filter)
            .try_init()?;
    }
    Ok(())
}

/// Span wrapping one pipeline action with its audit attributes.
pub fn create_action_span(action: &str, actor: Option<&str>, hostname: &str) -> tracing::Span {
    tracing::info_span!(
        "pipeline_action",
        action = action,
        actor = actor,
        host = hostname,
    )
}
