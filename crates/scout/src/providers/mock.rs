use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{ContentObserver, Provider, Usage};
use crate::providers::stream::StreamCollector;

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<Message>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock provider whose responses may also be failures
    pub fn with_results(responses: Vec<Result<Message>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that fails every request
    pub fn failing(reason: &str) -> Self {
        Self::with_results((0..32).map(|_| Err(anyhow!(reason.to_string()))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        // Return empty response if no more pre-configured responses
        responses
            .pop_front()
            .unwrap_or_else(|| Ok(Message::assistant()))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream_completion(
        &self,
        _messages: &[Message],
        _tools: &[Tool],
        on_content: Option<&ContentObserver>,
    ) -> Result<(Message, Usage)> {
        let message = self.next_response()?;
        let mut collector = StreamCollector::new(on_content);
        for word in message.text().split_inclusive(' ') {
            collector.push(word);
        }
        collector.finish();
        Ok((message, Usage::default()))
    }

    async fn complete(&self, _messages: &[Message]) -> Result<(Message, Usage)> {
        Ok((self.next_response()?, Usage::default()))
    }
}
