use crate::log::Diagnostic;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors reported by [`Draw`][`crate::Draw`] and its components.
///
/// Every variant names the template, partial or path it concerns. None of
/// them are retried or recovered from internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings are missing or inconsistent, or a directory is unusable.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A template file does not exist.
    #[error("template `{name}` not found at {}", path.display())]
    TemplateNotFound { name: String, path: PathBuf },

    /// A directory requested for partial registration does not exist.
    #[error("directory {} not found", path.display())]
    DirectoryNotFound { path: PathBuf },

    /// An empty partial name or partial directory was given.
    #[error("invalid partial name `{0}`, provide the template name relative to the templates directory")]
    InvalidPartialName(String),

    /// A render that should be hydrated was given a blank identifier.
    #[error("missing unique id for template `{0}`, use `InstanceId::Static` to render without hydration")]
    MissingUniqueId(String),

    /// The template contains no markup node.
    #[error("template `{0}` is empty, add a root element to it")]
    EmptyTemplate(String),

    /// The template contains several top-level nodes.
    #[error("template `{name}` has {count} root nodes, wrap them in a single element")]
    MultipleRootNodes { name: String, count: usize },

    /// The single top-level node of the template is not an element.
    #[error("template `{0}` must have an element as its root node, found bare text")]
    InvalidRootNode(String),

    /// The compiler rejected the normalized template text.
    #[error("failed to compile template `{name}`: {source}")]
    Compile {
        name: String,
        #[source]
        source: Diagnostic,
    },

    /// A compiled or loaded renderer cannot be invoked.
    #[error(
        "invalid renderer for template `{name}`: {reason}, check the template syntax \
        and, if it uses partials, that they are registered"
    )]
    InvalidRenderer { name: String, reason: String },

    /// A renderer failed while producing output.
    #[error("failed to render template `{name}`: {source}")]
    Render {
        name: String,
        #[source]
        source: Diagnostic,
    },

    /// Render data could not be represented as a JSON object.
    #[error("invalid render data: {0}")]
    InvalidData(String),

    /// A filesystem operation failed.
    #[error("i/o failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value could not be encoded or decoded as JSON.
    #[error("invalid JSON for {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Shortcut for building an [`Error::Io`] in `map_err` calls.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
