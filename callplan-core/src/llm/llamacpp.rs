// callplan-core/src/llm/llamacpp.rs

//! Client for a llama.cpp server (or any OpenAI-compatible chat-completions
//! endpoint) with optional grammar-constrained decoding.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::grammar::{GrammarConverter, DEFAULT_COMMAND};
use super::{Completer, Message};

const MAX_RETRIES: u32 = 5;
const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: f64 = 2.0;

// Fixed seed keeps plans reproducible for a given prompt and schema.
const SEED: i64 = 42;

/// Configuration for the llama.cpp endpoint.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// When true, JSON Schemas passed to [`Completer::complete`] are
    /// converted to GBNF grammars and sent with the request.
    pub use_grammar: bool,
    /// External schema→grammar converter invocation.
    pub grammar_command: Vec<String>,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: String::new(),
            endpoint: String::new(),
            temperature: 0.1,
            top_p: 0.95,
            max_tokens: 2048,
            use_grammar: false,
            grammar_command: DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    grammar: Option<&'a str>,
    seed: i64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct Client {
    config: Config,
    http: reqwest::Client,
    grammar: GrammarConverter,
    control_tokens: Regex,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client for LLM endpoint")?;
        let grammar = GrammarConverter::new(config.grammar_command.clone());
        let control_tokens =
            Regex::new(r"<\|.*?\|>").context("failed to compile control-token pattern")?;
        Ok(Self {
            config,
            http,
            grammar,
            control_tokens,
        })
    }

    async fn request_completion(
        &self,
        messages: &[Message],
        grammar: Option<&str>,
    ) -> Result<String> {
        let request_body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            grammar,
            seed: SEED,
        };

        let mut retries = 0;
        let mut current_delay = INITIAL_DELAY;

        loop {
            let response = match self
                .http
                .post(&self.config.endpoint)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .json(&request_body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    if retries >= MAX_RETRIES {
                        return Err(anyhow!(
                            "network error after {} retries: {}",
                            MAX_RETRIES,
                            err
                        ));
                    }
                    retries += 1;
                    warn!(
                        error = %err,
                        delay = ?current_delay,
                        attempt = retries,
                        "network error sending completion request, retrying"
                    );
                    tokio::time::sleep(current_delay).await;
                    current_delay = next_delay(current_delay);
                    continue;
                }
            };

            let status = response.status();

            if (status.as_u16() == 429 || status.is_server_error()) && retries < MAX_RETRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|header| header.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(Duration::from_secs);
                let wait = retry_after.unwrap_or(current_delay);
                retries += 1;
                warn!(
                    %status,
                    delay = ?wait,
                    attempt = retries,
                    "completion request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                current_delay = next_delay(current_delay);
                continue;
            }

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                return Err(anyhow!("LLM endpoint returned {}: {}", status, body));
            }

            let completion: CompletionResponse = response
                .json()
                .await
                .context("failed to decode completion response")?;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("completion response contained no choices"))?;

            return Ok(choice.message.content);
        }
    }
}

fn next_delay(current: Duration) -> Duration {
    std::cmp::min(
        Duration::from_secs_f64(current.as_secs_f64() * BACKOFF_FACTOR),
        MAX_DELAY,
    )
}

#[async_trait]
impl Completer for Client {
    async fn complete(&self, messages: &[Message], json_schema: Option<&str>) -> Result<String> {
        let grammar = match json_schema {
            Some(schema) if self.config.use_grammar => Some(
                self.grammar
                    .convert(schema)
                    .await
                    .context("error converting JSON schema to grammar")?,
            ),
            _ => None,
        };

        debug!(
            num_messages = messages.len(),
            constrained = grammar.is_some(),
            "requesting completion"
        );
        let content = self.request_completion(messages, grammar.as_deref()).await?;
        Ok(self.control_tokens.replace_all(&content, "").into_owned())
    }
}
