//! Single-answer chat with history trimmed to a token budget.

use std::sync::Arc;

use flows_adapters::{ChatMessage, GenerationAdapter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Result;
use crate::metrics::METRICS;

/// Fixed cost of one message on the wire (role, separators).
const PER_MESSAGE_OVERHEAD: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_total_tokens: usize,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_total_tokens: 4096,
            system_prompt: "You are a helpful assistant. Answer the user's question concisely."
                .to_string(),
        }
    }
}

/// One earlier exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    /// Earlier turns that fit the budget and were sent
    pub history_used: usize,
    pub estimated_tokens: usize,
}

/// Rough token count: a quarter of the characters plus a fixed cost per
/// message.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| m.content.chars().count().div_ceil(4) + PER_MESSAGE_OVERHEAD)
        .sum()
}

fn build_messages(system_prompt: &str, history: &[ChatTurn], question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    for turn in history {
        messages.push(ChatMessage::user(turn.question.as_str()));
        messages.push(ChatMessage::assistant(turn.answer.as_str()));
    }
    messages.push(ChatMessage::user(question));
    messages
}

/// Drop the oldest turns until the prompt fits `max_total_tokens`.
///
/// The question itself is never dropped, so the result can still exceed the
/// budget when the question alone does.
pub fn trim_history<'a>(
    system_prompt: &str,
    history: &'a [ChatTurn],
    question: &str,
    max_total_tokens: usize,
) -> &'a [ChatTurn] {
    let mut start = 0;
    while start < history.len() {
        let tokens = estimate_tokens(&build_messages(system_prompt, &history[start..], question));
        if tokens <= max_total_tokens {
            break;
        }
        start += 1;
        debug!(
            remaining = history.len() - start,
            tokens, max_total_tokens, "reducing chat history to fit token limit"
        );
    }
    &history[start..]
}

pub struct ChatFlow {
    adapter: Arc<dyn GenerationAdapter>,
    config: ChatConfig,
}

impl ChatFlow {
    pub fn new(adapter: Arc<dyn GenerationAdapter>) -> Self {
        Self {
            adapter,
            config: ChatConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn ask(&self, question: &str, history: &[ChatTurn]) -> Result<ChatReply> {
        let kept = trim_history(
            &self.config.system_prompt,
            history,
            question,
            self.config.max_total_tokens,
        );
        let messages = build_messages(&self.config.system_prompt, kept, question);
        let estimated_tokens = estimate_tokens(&messages);

        METRICS.inc_generations();
        let answer = self.adapter.generate(&messages).await?;
        Ok(ChatReply {
            answer,
            history_used: kept.len(),
            estimated_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_counts_chars_and_overhead() {
        let msgs = vec![ChatMessage::user("abcdefgh"), ChatMessage::assistant("abc")];
        assert_eq!(estimate_tokens(&msgs), (2 + 4) + (1 + 4));
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn trims_oldest_turns_first() {
        let history: Vec<ChatTurn> = (0..10)
            .map(|i| ChatTurn::new(format!("q{i} {}", "x".repeat(400)), "a".repeat(400)))
            .collect();
        let kept = trim_history("", &history, "now?", 1000);
        assert!(kept.len() < history.len());
        assert_eq!(kept.last(), history.last());
        assert!(estimate_tokens(&build_messages("", kept, "now?")) <= 1000);
    }

    #[test]
    fn keeps_everything_under_budget() {
        let history = vec![ChatTurn::new("hi", "hello")];
        assert_eq!(trim_history("sys", &history, "q", 4096).len(), 1);
    }
}
