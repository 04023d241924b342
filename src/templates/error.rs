use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the template layer.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No app in the search path provides the template.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Inline source rejected before compilation.
    #[error("Illegal template")]
    IllegalTemplate,

    /// Inline source failed to compile or render. The message carries both
    /// the offending source and the engine's report.
    #[error("<pre>{template}</pre><pre>{detail}</pre>")]
    Render { template: String, detail: String },

    /// A named template failed to compile or render.
    #[error("Failed to render template '{name}': {source}")]
    Engine {
        name: String,
        #[source]
        source: handlebars::RenderError,
    },

    #[error("Line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TemplateError::NotFound(_))
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;
