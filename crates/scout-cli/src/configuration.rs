use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File};
use scout::condense::DEFAULT_MAX_TOKENS;
use scout::providers::{
    anthropic,
    configs::{
        AnthropicProviderConfig, OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig,
    },
    factory::ProviderType,
    ollama,
};
use scout::search::{SearchConfig, DEFAULT_SEARCH_URL};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
        }
    }

    // Convert to the scout ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl SearchSettings {
    pub fn into_config(self) -> SearchConfig {
        SearchConfig {
            url: self.url,
            username: self.username,
            password: self.password,
            api_key: self.api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    /// Token budget for a single tool result
    #[serde(default = "default_max_result_tokens")]
    pub max_result_tokens: usize,
    /// Summarize search results with the provider before the agent reads them
    #[serde(default = "default_rephrase")]
    pub rephrase: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_result_tokens: default_max_result_tokens(),
            rephrase: default_rephrase(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    /// Load settings from an optional TOML file, overridden by `SCOUT_*` variables
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("search.url", default_search_url())?
            .set_default("agent.max_result_tokens", default_max_result_tokens() as u64)?
            .set_default("agent.rephrase", default_rephrase())?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("SCOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&provider_field(field)),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Every required field lives in the provider section
fn provider_field(field: &str) -> String {
    match field {
        "provider" => "provider.type".to_string(),
        field => format!("provider.{}", field),
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_ollama_host() -> String {
    ollama::OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    ollama::OLLAMA_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    anthropic::ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_max_result_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_rephrase() -> bool {
    true
}
