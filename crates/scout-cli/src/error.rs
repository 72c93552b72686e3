use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted config key, e.g. `provider.api_key`
/// becomes `SCOUT_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "SCOUT_{}",
        field_path.replace('.', "__").to_uppercase()
    )
}
