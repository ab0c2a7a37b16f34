use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

pub const RAG_ANSWER: &str = "rag_answer";
pub const DEFAULT_ASSISTANT_NAME: &str = "SmartCare";

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

fn default_assistant_name() -> String {
    DEFAULT_ASSISTANT_NAME.to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    pub response_templates: HashMap<String, String>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if !self.response_templates.contains_key(RAG_ANSWER) {
            return Err(PromptError::TemplateNotFound(format!("response_templates:{}", RAG_ANSWER)));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, PromptError> {
        let config: PromptConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let config = PromptConfig::from_json(&file_content)?;
    info!(
        "Loaded {} prompt template(s) from {}",
        config.response_templates.len(),
        path.as_ref().display()
    );
    Ok(Arc::new(config))
}

fn get_response_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.response_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("response_templates:{}", key)))
}

/// Substitutes `{name}` placeholders in one pass, so braces inside the
/// substituted values are never expanded again.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn get_rag_answer_prompt(
    config: &PromptConfig,
    chat_history: &str,
    context: &str,
    question: &str
) -> Result<String, PromptError> {
    let template = get_response_template(config, RAG_ANSWER)?;
    Ok(
        render(template, &[
            ("assistant_name", &config.assistant_name),
            ("chat_history", chat_history),
            ("context", context),
            ("question", question),
        ])
    )
}
