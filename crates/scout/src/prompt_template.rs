use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

/// Prompts compiled into the binary, looked up by file name
const EMBEDDED_PROMPTS: &[(&str, &str)] = &[
    ("system.md", include_str!("prompts/system.md")),
    ("rephrase.md", include_str!("prompts/rephrase.md")),
];

fn embedded_prompt(name: &str) -> Option<&'static str> {
    EMBEDDED_PROMPTS
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, content)| *content)
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    // if the template_file doesn't exist, try the prompts embedded in the crate
    if !template_path.exists() {
        if let Some(template) = template_path.to_str().and_then(embedded_prompt) {
            return load_prompt(template, context_data);
        }
    }

    let template_content = fs::read_to_string(&template_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}
