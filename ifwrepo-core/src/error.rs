//! Error types for ifwrepo-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or applying a family template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template names a placeholder outside the recognised set.
    #[error("unknown placeholder '{{{name}}}' in template \"{template}\"; expected one of: {{platform}}, {{commit_hash}}, {{release_date}}")]
    UnknownPlaceholder { name: String, template: String },

    /// A `{` was opened but never closed.
    #[error("unterminated placeholder in template \"{template}\"")]
    Unterminated { template: String },

    /// A lone `}` outside any placeholder (use `}}` for a literal brace).
    #[error("unmatched '}}' in template \"{template}\"")]
    UnmatchedClose { template: String },

    /// The placeholder is recognised but has no value in this context.
    #[error("placeholder '{{{name}}}' has no value here (template \"{template}\")")]
    Unavailable { name: &'static str, template: String },
}

/// All errors that can arise from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, including file path and serde_yaml's line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A family template is unusable.
    #[error("family '{family}': {source}")]
    Template {
        family: String,
        #[source]
        source: TemplateError,
    },

    /// Structurally valid YAML that fails a semantic check.
    #[error("invalid config: {0}")]
    Invalid(String),
}
