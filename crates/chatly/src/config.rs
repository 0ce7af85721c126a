// Chatly/crates/chatly/src/config.rs

use anyhow::Result;
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: String,
    /// Operator-wide fallback completion key. Users without their own `sk-`
    /// key or endpoint URL ride on this one.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub completion_model: String,
    pub request_timeout_seconds: u64,
    pub stream_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!(
                "Failed to load .env file: {}. Using system environment variables.",
                e
            );
        } else {
            info!("Loaded environment variables from .env file");
        }

        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8000".into()).parse()?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/chatly.db".into()),
            openai_api_key,
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "gpt-3.5-turbo".into()),
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            stream_timeout_seconds: env::var("STREAM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Database Path: {}", self.database_path);
        info!("- Completion Base URL: {}", self.openai_base_url);
        info!("- Completion Model: {}", self.completion_model);
        info!(
            "- Server Default Key: {}",
            if self.openai_api_key.is_some() { "set" } else { "not set" }
        );
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Stream Timeout: {}s", self.stream_timeout_seconds);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.api_host, self.api_port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test Config with default values
    fn create_test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            database_path: "./data/chatly.db".to_string(),
            openai_api_key: Some("sk-server-default".to_string()),
            openai_base_url: "https://api.openai.com".to_string(),
            completion_model: "gpt-3.5-turbo".to_string(),
            request_timeout_seconds: 30,
            stream_timeout_seconds: 600,
        }
    }

    #[test]
    fn test_config_creation_with_default_values() {
        let config = create_test_config();

        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.api_port, 8000);
        assert_eq!(config.completion_model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_config_timeouts_are_positive() {
        let config = create_test_config();

        assert!(config.request_timeout_seconds > 0);
        assert!(config.stream_timeout_seconds > 0);
        // A streaming completion outlives an ordinary request
        assert!(config.stream_timeout_seconds >= config.request_timeout_seconds);
    }

    #[test]
    fn test_base_url_format() {
        let config = create_test_config();
        assert!(
            config.openai_base_url.starts_with("http://")
                || config.openai_base_url.starts_with("https://")
        );
    }

    #[test]
    fn test_database_path_not_empty() {
        let config = create_test_config();
        assert!(!config.database_path.is_empty());
    }

    #[test]
    fn test_server_default_key_can_be_absent() {
        let mut config = create_test_config();
        config.openai_api_key = None;
        assert!(config.openai_api_key.is_none());
    }
}
