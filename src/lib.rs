pub mod config;
pub mod settings;
pub mod display;
pub mod channel;
pub mod pipeline;

#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

pub use display::{ChatLog, DisplayLine, DisplaySink, LineHandle, LineKind};
pub use pipeline::rag::orchestrator::{ControllerOptions, PipelineController};
pub use pipeline::rag::types::{Readiness, RunOutcome, RunState};
pub use settings::{JsonSettingsStore, MemorySettings, SettingsSource};

/// Install the fmt subscriber. Returns `false` when the host already
/// installed one.
pub fn init_tracing() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
    installed
}
