use super::payload::NarrativePayload;
use super::sanitize::{consume_narrative, fallback_narrative};
use crate::config::NarrativeConfig;
use crate::error::{FinancialHealthError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// External text generator for assessment summaries.
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate(&self, payload: &NarrativePayload) -> Result<String>;

    /// A disabled service is never called; the template is used directly.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when no generation backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNarrativeService;

#[async_trait]
impl NarrativeService for DisabledNarrativeService {
    async fn generate(&self, _payload: &NarrativePayload) -> Result<String> {
        Err(FinancialHealthError::NarrativeUnavailable(
            "no narrative service is configured".to_string(),
        ))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Service,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeOutcome {
    pub text: String,
    pub source: NarrativeSource,
    /// Service calls made, including the successful one
    pub attempts: u32,
    /// Why the template was used, when it was
    pub fallback_reason: Option<String>,
}

pub struct NarrativeGenerator {
    service: Arc<dyn NarrativeService>,
    config: NarrativeConfig,
}

impl NarrativeGenerator {
    pub fn new(service: Arc<dyn NarrativeService>, config: NarrativeConfig) -> Self {
        Self { service, config }
    }

    pub fn disabled(config: NarrativeConfig) -> Self {
        Self::new(Arc::new(DisabledNarrativeService), config)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff();
        let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = (self.config.backoff_ms / 4).max(1);
        exponential + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    fn template(&self, payload: &NarrativePayload, attempts: u32, reason: String) -> NarrativeOutcome {
        NarrativeOutcome {
            text: fallback_narrative(payload),
            source: NarrativeSource::Template,
            attempts,
            fallback_reason: Some(reason),
        }
    }

    /// Asks the service for a narrative, retrying with backoff, and falls back to the
    /// deterministic template when every attempt fails, times out or is rejected.
    pub async fn narrate(&self, payload: &NarrativePayload) -> NarrativeOutcome {
        if !self.service.is_enabled() {
            debug!("Narrative service disabled; using template");
            return self.template(payload, 0, "narrative service disabled".to_string());
        }

        let timeout = self.config.timeout();
        let mut last_error = String::new();
        let mut attempts = 0;

        for attempt in 0..=self.config.max_retries {
            attempts += 1;
            match tokio::time::timeout(timeout, self.service.generate(payload)).await {
                Ok(Ok(raw)) => match consume_narrative(&raw, self.config.max_narrative_chars) {
                    Ok(text) => {
                        info!("Narrative generated after {} attempt(s)", attempts);
                        return NarrativeOutcome {
                            text,
                            source: NarrativeSource::Service,
                            attempts,
                            fallback_reason: None,
                        };
                    }
                    Err(e) => last_error = e.to_string(),
                },
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("narrative service timed out after {:?}", timeout)
                }
            }
            warn!("Narrative attempt {} failed: {}", attempts, last_error);

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        warn!(
            "Narrative service failed after {} attempt(s); using template",
            attempts
        );
        self.template(payload, attempts, last_error)
    }
}
