use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::DetectError;
use crate::normalize::FallbackPolarity;

/// Classifier tried when DETECTOR_ENDPOINTS is not set
pub const DEFAULT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/dima806/deepfake_vs_real_image_detection";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub detector: DetectorConfig,
}

/// Engine configuration. Immutable after startup; the endpoint order is
/// the failover priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub endpoints: Vec<String>,
    pub api_token: String,
    pub call_timeout_secs: u64,
    pub retry_wait_ceiling_secs: u64,
    pub request_timeout_secs: u64,
    pub fallback_polarity: FallbackPolarity,
}

impl DetectorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), DetectError> {
        if self.api_token.trim().is_empty() {
            return Err(DetectError::Config(
                "backend credential is not set (HF_TOKEN)".to_string(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(DetectError::Config(
                "endpoint list is empty (DETECTOR_ENDPOINTS)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // Ordered failover list, highest priority first
        let endpoints = env::var("DETECTOR_ENDPOINTS")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api_token = env::var("HF_TOKEN").unwrap_or_default();

        let call_timeout_secs = env::var("DETECTOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let retry_wait_ceiling_secs = env::var("RETRY_WAIT_CEILING_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "90".to_string())
            .parse()
            .unwrap_or(90);

        let fallback_polarity = env::var("FALLBACK_POLARITY")
            .ok()
            .and_then(|value| FallbackPolarity::parse(&value))
            .unwrap_or_default();

        Ok(Self {
            api_host,
            api_port,
            detector: DetectorConfig {
                endpoints,
                api_token,
                call_timeout_secs,
                retry_wait_ceiling_secs,
                request_timeout_secs,
                fallback_polarity,
            },
        })
    }
}
