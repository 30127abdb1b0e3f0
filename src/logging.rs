// ABOUTME: Structured logging setup — every module logs through tracing, never println!
// ABOUTME: Request-scoped fields (request id, workspace id, user id) are attached via tracing::Span in the HTTP middleware chain

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output shape for process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized when stdout is a tty. The default for local development.
    Pretty,
    /// One JSON object per line, for log aggregation in deployed environments.
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("HUB_LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// The filter honors `RUST_LOG` (falling back to `info` for the Hub's own
/// crates and `warn` for dependencies) so operators can turn up verbosity
/// for one module without rebuilding.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hub_mcp_server=debug,hub_core=debug"));

    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(true)).init();
        }
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_target(true)).init();
        }
    }
}
