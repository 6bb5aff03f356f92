use std::sync::Arc;
use tts_pipeline::{Config, EnginePipeline};

/// Immutable state shared by every handler. The pipeline serializes adapter
/// calls itself when an engine cannot run concurrently.
#[derive(Clone)]
pub struct ServerContext {
    pub pipeline: Arc<EnginePipeline>,
    pub config: Arc<Config>,
}

impl ServerContext {
    pub fn new(pipeline: EnginePipeline, config: Config) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}
