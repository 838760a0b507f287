use std::time::Duration;

use rand::Rng;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chart::ChartOfAccounts;
use crate::models::SourceType;
use crate::settings::LlmSettings;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("request rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("client not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Only these are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Server(_))
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Generative model behind a blocking call.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, prompt: &str, temperature: f32, timeout: Duration) -> LlmResult<String>;
}

const SYSTEM_PROMPT: &str = "You are a bookkeeping assistant. You assign a bank or card transaction \
to exactly one account from the chart of accounts you are given. Reply with the account exactly as \
written in the chart and nothing else.";

/// OpenAI-compatible chat completions endpoint.
pub struct HttpCompletionClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> LlmResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Reads the API key from the environment variable named in settings.
    pub fn from_settings(settings: &LlmSettings) -> LlmResult<Self> {
        let key = std::env::var(&settings.api_key_env)
            .map_err(|_| LlmError::NotConfigured(format!("{} is not set", settings.api_key_env)))?;
        Self::new(&settings.base_url, &settings.model, &key)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, prompt: &str, temperature: f32, timeout: Duration) -> LlmResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens: 40,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if status.is_server_error() {
            return Err(LlmError::Server(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LlmError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let out: ChatResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Malformed(e.to_string())
            }
        })?;
        Ok(out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Bounded attempts with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped, plus up to 50% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.5);
        exp + exp.mul_f64(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(&self, mut op: impl FnMut() -> LlmResult<T>) -> LlmResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn sign_guidance(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Bank => "This is a bank account: positive amounts are money leaving the account \
                             (expenses, transfers out), negative amounts are money coming in (income, deposits).",
        SourceType::Card => "This is a credit card: positive amounts are charges (expenses), negative \
                             amounts are payments to the card or refunds.",
        SourceType::Loan => "This is a loan or line of credit: positive amounts are draws or interest \
                             charged, negative amounts are payments toward the balance.",
    }
}

/// Prompt with the full chart, the transaction and sign guidance for its source type.
pub fn build_prompt(
    chart: &ChartOfAccounts,
    memo: &str,
    amount: &str,
    source: &str,
    source_type: SourceType,
) -> String {
    let memo: String = memo.chars().take(200).collect();
    let mut prompt = String::from("Chart of accounts:\n");
    for entry in chart.entries() {
        if entry != source {
            prompt.push_str(entry);
            prompt.push('\n');
        }
    }
    prompt.push_str(&format!(
        "\nTransaction:\n  memo: {memo}\n  amount: {amount}\n  source account: {source} ({source_type})\n\n{}\n\n\
         Answer with one account from the chart, exactly as written. If unsure, answer {}.",
        sign_guidance(source_type),
        chart.default_account(),
    ));
    prompt
}

/// Accept an answer only if it names a chart entry other than `source`.
pub fn parse_answer<'a>(chart: &'a ChartOfAccounts, answer: &str, source: &str) -> Option<&'a str> {
    let line = answer
        .lines()
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '`' || c == '\'' || c == '.'))
        .find(|l| !l.is_empty())?;
    let account = chart.lookup(line)?;
    if account == source {
        debug!(answer = line, "model answered with the source account");
        return None;
    }
    Some(account)
}
