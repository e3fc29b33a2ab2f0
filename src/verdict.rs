//! Verdict engine: sequential failover over the configured classifier
//! backends, retry-once on cold start, and verdict derivation.
//!
//! Per-endpoint failures never surface to the caller. Every failure
//! advances to the next endpoint; only total exhaustion produces the
//! terminal all-failed verdict, still as a well-formed result.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::backend::{BackendClient, PredictionSet};
use crate::config::DetectorConfig;
use crate::error::{DetectError, Result};
use crate::metrics;
use crate::normalize::{normalize, FallbackPolarity, Normalized};

const LABEL_SYNTHETIC: &str = "AI";
const LABEL_AUTHENTIC: &str = "Real";
const LABEL_ALL_FAILED: &str = "All Models Failed";

/// Final classification for one uploaded image. Built once per request
/// and returned immediately; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub is_synthetic: bool,
    pub confidence: f64,
    pub label: String,
    pub synthetic_score: f64,
    pub authentic_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    fn from_normalized(normalized: Normalized, endpoint: &str) -> Self {
        if let Some(pick) = normalized.fallback {
            // Unrecognized taxonomy: report the top-scoring raw label and
            // flag the verdict so it cannot pass for a matched result.
            // A zero-score pick resolves to authentic like any other tie.
            let is_synthetic = pick.synthetic && pick.score > 0.0;
            let (synthetic_score, authentic_score) = if is_synthetic {
                (pick.score, 0.0)
            } else {
                (0.0, pick.score)
            };
            return Verdict {
                is_synthetic,
                confidence: pick.score,
                label: pick.label,
                synthetic_score,
                authentic_score,
                source: Some(endpoint.to_string()),
                message: Some("Unrecognized label taxonomy, best-effort fallback".to_string()),
            };
        }

        let scores = normalized.scores;
        let is_synthetic = scores.synthetic > scores.authentic;
        let confidence = if is_synthetic {
            scores.synthetic
        } else {
            scores.authentic
        };
        let label = if is_synthetic {
            LABEL_SYNTHETIC
        } else {
            LABEL_AUTHENTIC
        };

        Verdict {
            is_synthetic,
            confidence,
            label: label.to_string(),
            synthetic_score: scores.synthetic,
            authentic_score: scores.authentic,
            source: Some(endpoint.to_string()),
            message: None,
        }
    }

    /// Structured failure result; the caller always gets a Verdict,
    /// never an error.
    pub fn failure(label: &str, message: impl Into<String>) -> Self {
        Verdict {
            is_synthetic: false,
            confidence: 0.0,
            label: label.to_string(),
            synthetic_score: 0.0,
            authentic_score: 0.0,
            source: None,
            message: Some(message.into()),
        }
    }
}

pub struct VerdictEngine {
    client: BackendClient,
    endpoints: Vec<String>,
    retry_wait_ceiling: Duration,
    request_timeout: Duration,
    fallback_polarity: FallbackPolarity,
}

impl VerdictEngine {
    /// Build the engine from validated configuration. Fails fast on a
    /// missing credential or an empty endpoint list.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;

        let call_timeout = config.call_timeout();
        let client = BackendClient::new(config.api_token, call_timeout)?;

        Ok(Self {
            client,
            endpoints: config.endpoints,
            retry_wait_ceiling: Duration::from_secs(config.retry_wait_ceiling_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            fallback_polarity: config.fallback_polarity,
        })
    }

    /// Classify one image against the configured backends in priority
    /// order. The whole call is bounded by the request timeout.
    pub async fn classify(&self, image: &[u8]) -> Verdict {
        match timeout(self.request_timeout, self.classify_inner(image)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(
                    "Classification timed out after {}s",
                    self.request_timeout.as_secs()
                );
                Verdict::failure(
                    LABEL_ALL_FAILED,
                    format!(
                        "request timed out after {}s",
                        self.request_timeout.as_secs()
                    ),
                )
            }
        }
    }

    async fn classify_inner(&self, image: &[u8]) -> Verdict {
        let mut last_failure: Option<String> = None;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if index > 0 {
                metrics::BACKEND_FAILOVERS.inc();
            }

            match self.attempt_endpoint(endpoint, image).await {
                Ok(set) => {
                    metrics::BACKEND_ATTEMPTS.with_label_values(&["success"]).inc();
                    let normalized = normalize(set, self.fallback_polarity);
                    let verdict = Verdict::from_normalized(normalized, endpoint);
                    info!(
                        "Verdict: {} ({:.2}%) via {}",
                        verdict.label,
                        verdict.confidence * 100.0,
                        endpoint
                    );
                    return verdict;
                }
                Err(err) => {
                    metrics::BACKEND_ATTEMPTS.with_label_values(&[err.kind()]).inc();
                    warn!("Backend {} failed: {}", endpoint, err);
                    last_failure = Some(format!("{}: {}", endpoint, err));
                }
            }
        }

        let reason = last_failure.unwrap_or_else(|| "no endpoints configured".to_string());
        Verdict::failure(LABEL_ALL_FAILED, reason)
    }

    /// One endpoint attempt: a single call, plus at most one retry after
    /// a cold-start signal. A second cold-start signal is a failure.
    async fn attempt_endpoint(&self, endpoint: &str, image: &[u8]) -> Result<PredictionSet> {
        match self.client.invoke(endpoint, image).await {
            Err(DetectError::UpstreamLoading { retry_after_secs }) => {
                let wait = Duration::from_secs_f64(retry_after_secs).min(self.retry_wait_ceiling);
                info!(
                    "Backend {} warming up, retrying in {:.1}s",
                    endpoint,
                    wait.as_secs_f64()
                );
                sleep(wait).await;
                self.client.invoke(endpoint, image).await
            }
            outcome => outcome,
        }
    }
}
