use std::env;
use std::time::Duration;

use crate::thinking::DEFAULT_REVEAL_INTERVAL;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_hostname: String,
    // Optional so the server can start without it and report the
    // missing configuration per request
    pub openai_api_key: Option<String>,
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub reveal_interval_ms: u64,
    pub web_ui_path: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {}", key, value);
            default
        }),
        Err(_) => default,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let openai_api_hostname = env::var("THINKCHAT_OPENAI_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let text_model = env::var("THINKCHAT_TEXT_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
        let vision_model =
            env::var("THINKCHAT_VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let max_tokens = env_or("THINKCHAT_MAX_TOKENS", 4000);
        let temperature = env_or("THINKCHAT_TEMPERATURE", 0.7);
        let reveal_interval_ms = env_or(
            "THINKCHAT_REVEAL_INTERVAL_MS",
            DEFAULT_REVEAL_INTERVAL.as_millis() as u64,
        );
        let web_ui_path =
            env::var("THINKCHAT_WEB_UI_PATH").unwrap_or_else(|_| "./web-ui".to_string());

        Self {
            openai_api_hostname,
            openai_api_key,
            text_model,
            vision_model,
            max_tokens,
            temperature,
            reveal_interval_ms,
            web_ui_path,
        }
    }
}

impl AppConfig {
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }
}
