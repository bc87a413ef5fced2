//! DeepSeek API Client
//!
//! Chat-completions client that turns the prompt into a validated
//! [`TradingDecision`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

use super::error::DecisionError;
use super::models::{ChatMessage, ChatRequest, ChatResponse};
use super::parse::parse_decision;
use super::prompt::{AdditionalContext, PromptBuilder, SYSTEM_PROMPT};
use super::DecisionProvider;
use crate::decision::TradingDecision;
use crate::types::MultiTimeframe;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Default reasoning model
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Connection settings for the DeepSeek API
#[derive(Debug, Clone)]
pub struct DeepSeekConfig {
    pub api_key: String,
    /// API root, without the `/v1/...` path (default: https://api.deepseek.com)
    pub base_url: String,
    /// Model name (default: deepseek-reasoner)
    pub model: String,
    /// Request timeout; reasoning models are slow (default: 120s)
    pub timeout: Duration,
    /// Build prompts but never call the API
    pub dry_run: bool,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            dry_run: false,
        }
    }
}

/// DeepSeek-backed decision provider
pub struct DeepSeekProvider {
    client: Client,
    config: DeepSeekConfig,
    prompt: PromptBuilder,
}

impl DeepSeekProvider {
    pub fn new(config: DeepSeekConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            prompt: PromptBuilder::default(),
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Send one chat request and return the first choice's content
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, DecisionError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        info!("API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("API error response: {}", body);
            return Err(DecisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await?;
        debug!("Raw API response: {}", raw);

        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| DecisionError::Decode(format!("chat response: {e}")))?;
        Ok(parsed.first_content().to_string())
    }

    /// Minimal request to check the key and endpoint
    pub async fn ping(&self) -> Result<(), DecisionError> {
        self.chat(vec![ChatMessage::user("Hello")]).await?;
        Ok(())
    }
}

#[async_trait]
impl DecisionProvider for DeepSeekProvider {
    async fn get_trading_decision(
        &self,
        frames: &MultiTimeframe,
        context: &AdditionalContext,
    ) -> Result<TradingDecision, DecisionError> {
        let prompt = self.prompt.build(frames, Some(context));
        info!("Generated prompt ({} chars)", prompt.len());
        debug!("{}", prompt);

        if self.config.dry_run {
            info!("Dry run mode - skipping API call");
            return Ok(TradingDecision::neutral("Dry run mode - no API call made"));
        }

        let content = self
            .chat(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)])
            .await?;

        let decision = parse_decision(&content, frames.current_price())?;
        info!(
            "Model decision: pos={:.2} conf={:.2} tp={:?} sl={:?}",
            decision.position, decision.confidence, decision.take_profit, decision.stop_loss
        );
        Ok(decision)
    }
}
