use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scout::agent::Agent;
use scout::condense::Condenser;
use scout::models::tool::Tool;
use scout::prompt_template::load_prompt_file;
use scout::providers::factory::get_provider;
use scout::rephrase::Rephraser;
use scout::search::elasticsearch::ElasticsearchBackend;
use scout::tools::{definitions, ToolExecutor};

mod configuration;
mod error;
mod prompt;
mod session;

use configuration::Settings;
use prompt::{print_stream, PlainPrompt, RustylinePrompt};
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file, overridden by SCOUT_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Replace the built-in system prompt with this template
    #[arg(long, global = true)]
    prompt_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
    },
    /// Ask questions interactively
    Chat,
}

#[derive(Serialize)]
struct SystemContext<'a> {
    tools: &'a [Tool],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scout=info,scout_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", style(format!("Could not load settings: {}", e)).red());
            std::process::exit(2);
        }
    };
    let agent = build_agent(settings, cli.prompt_file)?;

    match cli.command {
        Command::Ask { question } => {
            Session::new(agent, Box::new(PlainPrompt))
                .headless_start(&question)
                .await;
        }
        Command::Chat => {
            let prompt = RustylinePrompt::new()?;
            Session::new(agent, Box::new(prompt)).start().await?;
        }
    }
    Ok(())
}

fn build_agent(settings: Settings, prompt_file: Option<PathBuf>) -> Result<Agent> {
    tracing::info!(
        provider = %settings.provider.provider_type(),
        search = %settings.search.url,
        rephrase = settings.agent.rephrase,
        "starting scout"
    );

    let provider = get_provider(settings.provider.into_config())?;
    let backend = Arc::new(ElasticsearchBackend::new(settings.search.into_config())?);
    let rephraser = if settings.agent.rephrase {
        Rephraser::new(provider.clone())
    } else {
        Rephraser::disabled()
    };
    let executor = ToolExecutor::new(backend, rephraser)
        .with_condenser(Condenser::new(settings.agent.max_result_tokens));

    let mut agent = Agent::new(provider, executor)?.with_observer(Box::new(print_stream));
    if let Some(path) = prompt_file {
        let system_prompt = load_prompt_file(
            path,
            &SystemContext {
                tools: definitions(),
            },
        )?;
        agent = agent.with_system_prompt(system_prompt);
    }
    Ok(agent)
}
