use serde::Serialize;
use std::sync::Arc;

use crate::models::message::Message;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;

#[derive(Serialize)]
struct RephraseContext<'a> {
    query: &'a str,
}

/// Best-effort summarization of tool output into an answer-shaped text.
///
/// Never fails: any problem with the completion service hands back the input unchanged.
#[derive(Clone)]
pub struct Rephraser {
    provider: Option<Arc<dyn Provider>>,
}

impl Rephraser {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A rephraser that passes results through untouched
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn rephrase(&self, query: &str, result: &str) -> String {
        let Some(provider) = &self.provider else {
            return result.to_string();
        };

        let instructions = match load_prompt_file("rephrase.md", &RephraseContext { query }) {
            Ok(instructions) => instructions,
            Err(e) => {
                tracing::warn!(error = %e, "could not render rephrase prompt, returning raw results");
                return result.to_string();
            }
        };
        let messages = vec![
            Message::system(instructions),
            Message::user().with_text(format!(
                "Question: {}\n\nSearch results:\n{}",
                query, result
            )),
        ];

        match provider.complete(&messages).await {
            Ok((message, _)) if message.has_text() => message.text().to_string(),
            Ok(_) => {
                tracing::warn!("rephrasing returned no text, returning raw results");
                result.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "rephrasing failed, returning raw results");
                result.to_string()
            }
        }
    }
}
