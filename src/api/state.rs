use std::sync::Arc;

use crate::core::AppConfig;
use crate::openai::{CompletionService, OpenAiClient};

pub struct AppState {
    pub config: AppConfig,
    pub completion: Arc<dyn CompletionService>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let completion = Arc::new(OpenAiClient::from_config(&config));
        Self { config, completion }
    }

    /// Use a different completion backend, e.g. a fake in tests.
    pub fn with_completion_service(
        config: AppConfig,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self { config, completion }
    }
}
