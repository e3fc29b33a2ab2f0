//! HTTP client for one remote classifier backend.
//!
//! Sends the raw image bytes with a bearer credential and decodes the
//! prediction list. Exactly one network call per invocation: retry on
//! cold start and failover to other backends belong to the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{DetectError, Result};

/// Wait applied when a cold-starting backend omits its retry estimate
pub const DEFAULT_RETRY_HINT_SECS: f64 = 10.0;

/// One (label, score) pair as reported by a classifier backend.
/// Both fields tolerate absence on the wire: a missing label decays to
/// an empty string and a missing score to 0.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPrediction {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub score: f64,
}

/// Prediction list for one request. Some backends wrap the list in one
/// extra nesting level (`[[..]]`), so decoding accepts both shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictionSet {
    Flat(Vec<RawPrediction>),
    Nested(Vec<Vec<RawPrediction>>),
}

impl PredictionSet {
    /// Unwrap single-element nesting; multi-element nesting flattens in order.
    pub fn into_predictions(self) -> Vec<RawPrediction> {
        match self {
            PredictionSet::Flat(predictions) => predictions,
            PredictionSet::Nested(mut outer) if outer.len() == 1 => outer.remove(0),
            PredictionSet::Nested(outer) => outer.into_iter().flatten().collect(),
        }
    }
}

/// 503 body emitted while the model is cold-starting
#[derive(Debug, Deserialize)]
struct LoadingBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    estimated_time: Option<f64>,
}

pub struct BackendClient {
    http: reqwest::Client,
    api_token: String,
}

impl BackendClient {
    pub fn new(api_token: String, call_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| DetectError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, api_token })
    }

    /// Send one image to one classifier endpoint and decode the result.
    pub async fn invoke(&self, endpoint: &str, image: &[u8]) -> Result<PredictionSet> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_token)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                DetectError::UpstreamUnavailable(format!("request to {} failed: {}", endpoint, e))
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            // Cold start. The body usually carries an estimated retry delay.
            let hint = match response.json::<LoadingBody>().await {
                Ok(body) => {
                    if let Some(message) = body.error {
                        debug!("Backend {} still loading: {}", endpoint, message);
                    }
                    body.estimated_time
                        .filter(|t| t.is_finite() && *t >= 0.0)
                        .unwrap_or(DEFAULT_RETRY_HINT_SECS)
                }
                Err(_) => DEFAULT_RETRY_HINT_SECS,
            };
            return Err(DetectError::UpstreamLoading {
                retry_after_secs: hint,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DetectError::UpstreamAuth);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut reason = format!("status {}", status.as_u16());
            if !body.is_empty() {
                reason.push_str(": ");
                reason.push_str(truncate(&body, 200));
            }
            return Err(DetectError::UpstreamUnavailable(reason));
        }

        response
            .json::<PredictionSet>()
            .await
            .map_err(|e| DetectError::MalformedResponse(e.to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
