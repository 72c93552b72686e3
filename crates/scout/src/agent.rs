use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCallRequest};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{ContentObserver, Provider};
use crate::tools::{definitions, ToolExecutor, REPLY};

/// Conversation length after which the loop gives up
pub const MAX_MESSAGES: usize = 20;

pub const FALLBACK_RESPONSE: &str = "I'm sorry, I wasn't able to find a complete answer to your question within the allowed number of steps. Please try rephrasing it or narrowing it down.";

/// Returned when the loop finished without ever settling on an answer
pub const NO_RESPONSE: &str = "No response generated.";

#[derive(Serialize)]
struct SystemContext<'a> {
    tools: &'a [Tool],
}

/// Everything one query accumulates while the loop runs
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub is_complete: bool,
    pub final_response: Option<String>,
    pub turns: usize,
}

impl AgentState {
    fn new(system_prompt: &str, query: &str) -> Self {
        Self {
            messages: vec![
                Message::system(system_prompt),
                Message::user().with_text(query),
            ],
            ..Self::default()
        }
    }

    fn finish(&mut self, response: impl Into<String>) {
        self.final_response = Some(response.into());
        self.is_complete = true;
    }

    /// Force completion once the conversation outgrows [`MAX_MESSAGES`]
    fn enforce_ceiling(&mut self) {
        if !self.is_complete && self.messages.len() > MAX_MESSAGES {
            tracing::warn!(
                messages = self.messages.len(),
                turns = self.turns,
                "conversation hit the message ceiling, giving up"
            );
            self.finish(FALLBACK_RESPONSE);
        }
    }
}

/// Agent drives a completion provider through search tools until it replies
pub struct Agent {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    system_prompt: String,
    observer: Option<Box<ContentObserver>>,
    state: AgentState,
}

impl Agent {
    /// Create an agent using the built-in system prompt
    pub fn new(provider: Arc<dyn Provider>, executor: ToolExecutor) -> Result<Self> {
        let system_prompt = load_prompt_file(
            "system.md",
            &SystemContext {
                tools: definitions(),
            },
        )?;

        Ok(Self {
            provider,
            executor,
            system_prompt,
            observer: None,
            state: AgentState::default(),
        })
    }

    /// Receive streamed assistant text as it arrives
    pub fn with_observer(mut self, observer: Box<ContentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// The conversation of the most recent query
    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    /// Answer a question, searching as many times as the model needs.
    ///
    /// Never fails: errors along the way become the returned answer.
    pub async fn process_query(&mut self, query: &str) -> String {
        self.state = AgentState::new(&self.system_prompt, query);

        if let Err(e) = self.run().await {
            tracing::error!(error = %e, turns = self.state.turns, "query processing failed");
            self.state
                .finish(format!("An error occurred while processing your query: {}", e));
        }

        self.state
            .final_response
            .clone()
            .unwrap_or_else(|| NO_RESPONSE.to_string())
    }

    async fn run(&mut self) -> Result<()> {
        while !self.state.is_complete {
            self.state.turns += 1;
            let (response, usage) = self
                .provider
                .stream_completion(
                    &self.state.messages,
                    definitions(),
                    self.observer.as_deref(),
                )
                .await?;
            tracing::debug!(
                turn = self.state.turns,
                tool_calls = response.tool_calls.len(),
                output_tokens = ?usage.output_tokens,
                "assistant turn complete"
            );

            let tool_calls = response.tool_calls.clone();
            let answer = (tool_calls.is_empty() && response.has_text())
                .then(|| response.text().to_string());
            self.state.messages.push(response);

            if let Some(answer) = answer {
                self.state.finish(answer);
                break;
            }

            self.dispatch(tool_calls).await;
            self.state.enforce_ceiling();
        }
        Ok(())
    }

    /// Run the requested tools in order, stopping at `reply`.
    ///
    /// Once the conversation is past [`MAX_MESSAGES`] the remaining tools are skipped,
    /// but a `reply` later in the batch still ends the query.
    async fn dispatch(&mut self, tool_calls: Vec<ToolCallRequest>) {
        for call in tool_calls {
            let args = match call.parse_arguments() {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(id = %call.id, tool = %call.name, error = %e, "skipping tool call");
                    continue;
                }
            };

            let reply = (call.name == REPLY)
                .then(|| args.get("message").and_then(|v| v.as_str()))
                .flatten();
            if reply.is_none() && self.state.messages.len() > MAX_MESSAGES {
                tracing::debug!(id = %call.id, tool = %call.name, "past the message ceiling, not executing");
                continue;
            }

            let output = self.executor.execute(&call.name, &args).await;
            if let Some(message) = reply {
                self.state.finish(message);
                return;
            }

            self.state
                .messages
                .push(Message::tool(call.id, call.name, output));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::providers::mock::MockProvider;
    use crate::providers::stream::STREAM_START_MARKER;
    use crate::rephrase::Rephraser;
    use crate::search::mock::MockSearchBackend;
    use crate::tools::{GET_SCHEMA, LIST_COLLECTIONS};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Mutex;

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, name, arguments)
    }

    fn backend() -> Arc<MockSearchBackend> {
        Arc::new(
            MockSearchBackend::new()
                .with_collection("logs", json!({"properties": {}}))
                .with_collection("users", json!({"properties": {}})),
        )
    }

    fn agent(provider: Arc<MockProvider>, backend: Arc<MockSearchBackend>) -> Agent {
        let executor = ToolExecutor::new(backend, Rephraser::disabled());
        Agent::new(provider, executor).unwrap()
    }

    #[tokio::test]
    async fn test_content_response_is_final_answer() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("Hello there")
        ]));
        let mut agent = agent(provider.clone(), backend());

        let answer = agent.process_query("hi").await;

        assert_eq!(answer, "Hello there");
        assert_eq!(agent.messages().len(), 3);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_list_available_data_end_to_end() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_tool_request(tool_call("call_1", LIST_COLLECTIONS, "{}")),
            Message::assistant().with_text("There are two collections: logs and users."),
        ]));
        let backend = backend();
        let mut agent = agent(provider, backend.clone());

        let answer = agent.process_query("List the available data").await;

        assert_eq!(answer, "There are two collections: logs and users.");
        let roles: Vec<Role> = agent.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_message = &agent.messages()[3];
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_message.name.as_deref(), Some(LIST_COLLECTIONS));
        assert_eq!(tool_message.text(), "Available collections: logs, users");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_reply_stops_the_batch() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant()
            .with_tool_request(tool_call("a", LIST_COLLECTIONS, "{}"))
            .with_tool_request(tool_call("b", REPLY, r#"{"message": "Done searching"}"#))
            .with_tool_request(tool_call("c", GET_SCHEMA, r#"{"collection": "logs"}"#))]));
        let backend = backend();
        let mut agent = agent(provider.clone(), backend.clone());

        let answer = agent.process_query("what is there?").await;

        assert_eq!(answer, "Done searching");
        // system, user, assistant, result of the call before reply
        assert_eq!(agent.messages().len(), 4);
        assert_eq!(agent.messages()[3].tool_call_id.as_deref(), Some("a"));
        assert_eq!(backend.calls(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_arguments_are_skipped() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant()
            .with_tool_request(tool_call("a", GET_SCHEMA, "{\"collection\": "))
            .with_tool_request(tool_call("b", REPLY, r#"{"message": "No schema"}"#))]));
        let backend = backend();
        let mut agent = agent(provider, backend.clone());

        let answer = agent.process_query("schema of logs").await;

        assert_eq!(answer, "No schema");
        assert_eq!(agent.messages().len(), 3);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_reply_without_message_keeps_going() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_tool_request(tool_call("a", REPLY, "{}")),
            Message::assistant().with_text("Here is the answer."),
        ]));
        let mut agent = agent(provider, backend());

        let answer = agent.process_query("question").await;

        assert_eq!(answer, "Here is the answer.");
        let tool_message = &agent.messages()[3];
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.text().starts_with("Error:"));
        assert!(tool_message.text().contains("message"));
    }

    #[tokio::test]
    async fn test_endless_tool_calls_hit_the_ceiling() {
        let responses = (0..50)
            .map(|i| {
                Message::assistant().with_tool_request(tool_call(
                    &format!("call_{}", i),
                    LIST_COLLECTIONS,
                    "{}",
                ))
            })
            .collect();
        let provider = Arc::new(MockProvider::new(responses));
        let mut agent = agent(provider.clone(), backend());

        let answer = agent.process_query("loop forever").await;

        assert_eq!(answer, FALLBACK_RESPONSE);
        assert_eq!(agent.messages().len(), MAX_MESSAGES + 1);
        assert_eq!(provider.calls(), 10);
    }

    #[tokio::test]
    async fn test_reply_on_the_last_allowed_message_wins() {
        let mut responses: Vec<Message> = (0..9)
            .map(|i| {
                Message::assistant().with_tool_request(tool_call(
                    &format!("call_{}", i),
                    LIST_COLLECTIONS,
                    "{}",
                ))
            })
            .collect();
        responses.push(
            Message::assistant()
                .with_tool_request(tool_call("late", LIST_COLLECTIONS, "{}"))
                .with_tool_request(tool_call("done", REPLY, r#"{"message": "final answer"}"#)),
        );
        let provider = Arc::new(MockProvider::new(responses));
        let backend = backend();
        let mut agent = agent(provider.clone(), backend.clone());

        let answer = agent.process_query("keep looking").await;

        assert_eq!(answer, "final answer");
        assert_eq!(agent.messages().len(), MAX_MESSAGES + 1);
        assert_eq!(provider.calls(), 10);
        // the list-collections call sharing the final turn is past the ceiling
        assert_eq!(backend.calls(), 9);
    }

    #[tokio::test]
    async fn test_reply_with_empty_message_ends_the_query() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_tool_request(tool_call("a", REPLY, r#"{"message": ""}"#)),
        ]));
        let mut agent = agent(provider.clone(), backend());

        let answer = agent.process_query("say nothing").await;

        assert_eq!(answer, "");
        assert_eq!(agent.messages().len(), 3);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_responses_hit_the_ceiling() {
        // An exhausted mock answers with empty assistant messages
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider.clone(), backend());

        let answer = agent.process_query("anyone?").await;

        assert_eq!(answer, FALLBACK_RESPONSE);
        assert!(agent.messages().len() <= MAX_MESSAGES + 1);
        assert_eq!(provider.calls(), MAX_MESSAGES - 1);
    }

    #[tokio::test]
    async fn test_provider_error_becomes_answer() {
        let provider = Arc::new(MockProvider::with_results(vec![Err(anyhow!(
            "Server error: 503"
        ))]));
        let mut agent = agent(provider, backend());

        let answer = agent.process_query("anything").await;

        assert_eq!(
            answer,
            "An error occurred while processing your query: Server error: 503"
        );
        assert_eq!(agent.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_error_after_tool_turn() {
        let provider = Arc::new(MockProvider::with_results(vec![
            Ok(Message::assistant().with_tool_request(tool_call("a", LIST_COLLECTIONS, "{}"))),
            Err(anyhow!("connection reset")),
        ]));
        let mut agent = agent(provider, backend());

        let answer = agent.process_query("anything").await;

        assert!(answer.ends_with("connection reset"));
        assert_eq!(agent.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_observer_sees_marker_once() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("Three collections exist")
        ]));
        let mut agent = agent(provider, backend()).with_observer(Box::new(move |chunk: &str| {
            sink.lock().unwrap().push_str(chunk)
        }));

        agent.process_query("how many?").await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            format!("{}Three collections exist\n", STREAM_START_MARKER)
        );
        assert_eq!(seen.matches(STREAM_START_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn test_each_query_starts_fresh() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("first"),
            Message::assistant().with_text("second"),
        ]));
        let mut agent = agent(provider, backend()).with_system_prompt("Be brief.");

        assert_eq!(agent.process_query("one").await, "first");
        assert_eq!(agent.process_query("two").await, "second");

        let messages = agent.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text(), "Be brief.");
        assert_eq!(messages[1].text(), "two");
    }

    #[test]
    fn test_system_prompt_lists_every_tool() {
        let agent = agent(Arc::new(MockProvider::new(vec![])), backend());
        for tool in definitions() {
            assert!(agent.system_prompt.contains(&format!("`{}`", tool.name)));
        }
    }
}
