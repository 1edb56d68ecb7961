//! Application state wiring the pipeline to its concrete collaborators.
//!
//! The pipeline is generic over backend and transport; AppState pins it to
//! the HTTP backend from relay-infra and the console transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use relay_core::pipeline::{PipelineDeps, RelayPipeline};
use relay_infra::backend::HttpCompletionBackend;
use relay_infra::config::LoadedConfig;
use relay_types::config::RelayConfig;

use crate::cli::chat::ConsoleTransport;

/// Concrete pipeline type used by both the console and the HTTP API.
pub type ConcretePipeline = RelayPipeline<HttpCompletionBackend, ConsoleTransport>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ConcretePipeline>,
    pub config: Arc<RelayConfig>,
    pub config_path: PathBuf,
    pub started_at: Instant,
}

impl AppState {
    /// Build the backend and start the pipeline. Must run inside a tokio runtime.
    pub fn init(loaded: LoadedConfig) -> anyhow::Result<Self> {
        let backend = HttpCompletionBackend::from_config(&loaded.config.backend, loaded.api_key)?;
        tracing::info!(
            url = %loaded.config.backend.url,
            model = %loaded.config.backend.model,
            config = %loaded.path.display(),
            from_file = loaded.from_file,
            "completion backend configured"
        );
        Ok(Self::with_backend(loaded.config, backend, loaded.path))
    }

    pub fn with_backend(
        config: RelayConfig,
        backend: HttpCompletionBackend,
        config_path: PathBuf,
    ) -> Self {
        let deps = PipelineDeps::new(
            &config,
            Arc::new(backend),
            Arc::new(ConsoleTransport::new()),
        );
        let pipeline = RelayPipeline::start(&config, deps);

        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            config_path,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
