use anyhow::Result;
use scout::agent::Agent;

use crate::prompt::{Input, Prompt};

/// One agent answering questions from a prompt, one at a time
pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>) -> Self {
        Session { agent, prompt }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt
            .render_notice("Ask a question about your data. Type \"exit\" to leave.");

        loop {
            match self.prompt.get_input()? {
                Input::Question(question) => self.ask(&question).await,
                Input::AskAgain => continue,
                Input::Exit => break,
            }
        }
        Ok(())
    }

    pub async fn headless_start(&mut self, question: &str) {
        self.ask(question).await;
    }

    async fn ask(&mut self, question: &str) {
        let answer = tokio::select! {
            answer = self.agent.process_query(question) => Some(answer),
            _ = tokio::signal::ctrl_c() => None,
        };

        match answer {
            Some(answer) => self.prompt.render_answer(&answer),
            None => self
                .prompt
                .render_notice("Interrupted, the question was abandoned."),
        }
    }
}
