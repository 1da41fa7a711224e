//! FAQ assistant backed by an OpenAI-compatible chat completion endpoint.
//!
//! The upstream call is optional and bounded by a timeout. Any failure is logged
//! and answered from the local keyword table instead, so the customer always
//! gets a reply.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;

/// Number of earlier turns forwarded upstream.
const HISTORY_LIMIT: usize = 10;
const MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = "You are the support assistant of a food delivery service. \
Answer questions about ordering, delivery times, order tracking, payment and accounts. \
Deliveries run from 9:00 AM to 11:00 PM every day and usually arrive within 30-45 minutes. \
Accepted payments: cash on delivery, mobile wallets and credit/debit cards. \
Be friendly and brief (at most four sentences). If you are unsure, offer to connect the \
customer with human support.";

const FAQ: &[(&[&str], &str)] = &[
    (
        &["delivery", "how long", "time"],
        "We deliver from 9:00 AM to 11:00 PM every day. Most orders arrive within 30-45 minutes.",
    ),
    (
        &["payment", "pay"],
        "We accept cash on delivery, mobile wallets and credit/debit cards.",
    ),
    (
        &["track", "where"],
        "Open the Orders page and pick your order to follow your rider on the map in real time.",
    ),
    (
        &["cancel"],
        "You can cancel an order from the Orders page until it is delivered. Contact support if you need help.",
    ),
    (
        &["hour", "open"],
        "We are open from 9:00 AM to 11:00 PM every day, including weekends and holidays.",
    ),
    (
        &["minimum", "min order"],
        "The minimum order amount depends on the restaurant and is shown on its menu.",
    ),
];

const DEFAULT_ANSWER: &str =
    "Thanks for reaching out! Our support team can help with anything else; just reply here or use the Contact page.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Assistant,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub source: ReplySource,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Deserialize)]
struct CompletionContent {
    content: String,
}

pub struct ChatService {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.chat_timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build chat client: {err}")))?;

        Ok(Self {
            client,
            api_url: config.chat_api_url.clone(),
            api_key: config.chat_api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    pub async fn reply(&self, message: &str, history: &[ChatTurn]) -> Result<ChatReply, AppError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("message is required".to_string()));
        }

        match self.ask_upstream(message, history).await {
            Ok(response) => Ok(ChatReply {
                response,
                source: ReplySource::Assistant,
            }),
            Err(err) => {
                warn!(error = %err, "chat upstream unavailable; answering from faq");
                Ok(ChatReply {
                    response: fallback_answer(message).to_string(),
                    source: ReplySource::Fallback,
                })
            }
        }
    }

    async fn ask_upstream(&self, message: &str, history: &[ChatTurn]) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::UpstreamUnavailable("no chat api key configured".to_string()))?;

        let recent = &history[history.len().saturating_sub(HISTORY_LIMIT)..];
        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(CompletionMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        messages.extend(recent.iter().map(|turn| CompletionMessage {
            role: match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &turn.content,
        }));
        messages.push(CompletionMessage {
            role: "user",
            content: message,
        });

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.7,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| AppError::UpstreamUnavailable(format!("chat request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "chat api returned {status}"
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|err| AppError::UpstreamUnavailable(format!("malformed chat response: {err}")))?;

        let answer = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::UpstreamUnavailable("empty chat completion".to_string()))?;

        debug!(chars = answer.len(), "chat completion received");
        Ok(answer)
    }
}

/// First FAQ entry whose keywords appear in the message.
pub fn fallback_answer(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    FAQ.iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(_, answer)| *answer)
        .unwrap_or(DEFAULT_ANSWER)
}
