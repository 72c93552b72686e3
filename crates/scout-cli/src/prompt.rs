use anyhow::Result;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mscout> \x1b[0m";

pub enum Input {
    Question(String),
    /// Nothing worth sending, ask again
    AskAgain,
    Exit,
}

/// Where questions come from and answers go to
pub trait Prompt {
    fn get_input(&mut self) -> Result<Input>;
    fn render_answer(&mut self, answer: &str);
    fn render_notice(&mut self, notice: &str);
}

pub struct RustylinePrompt {
    editor: DefaultEditor,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl Prompt for RustylinePrompt {
    fn get_input(&mut self) -> Result<Input> {
        let line = match self.editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(Input::Exit),
            Err(e) => {
                eprintln!("Input error: {}", e);
                return Ok(Input::Exit);
            }
        };

        let _ = self.editor.add_history_entry(line.as_str());
        Ok(parse_input(&line))
    }

    fn render_answer(&mut self, answer: &str) {
        print_answer(answer);
    }

    fn render_notice(&mut self, notice: &str) {
        println!("{}", style(notice).dim());
    }
}

/// Output only, for answering a question given on the command line
pub struct PlainPrompt;

impl Prompt for PlainPrompt {
    fn get_input(&mut self) -> Result<Input> {
        Ok(Input::Exit)
    }

    fn render_answer(&mut self, answer: &str) {
        print_answer(answer);
    }

    fn render_notice(&mut self, notice: &str) {
        eprintln!("{}", style(notice).dim());
    }
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        Input::AskAgain
    } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        Input::Exit
    } else {
        Input::Question(line.to_string())
    }
}

/// Streamed text is the model thinking out loud, keep it visually secondary
pub fn print_stream(chunk: &str) {
    print!("{}", style(chunk).dim());
    let _ = io::stdout().flush();
}

pub fn print_answer(answer: &str) {
    println!("\n{}\n{}\n", style("Answer").green().bold(), answer);
}
