//! Error types for warden-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from resolving a listen value.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The value matched the `[host:]port` grammar but the port is unusable.
    #[error("listen value {spec:?} has a port outside 1-65535")]
    InvalidPort { spec: String },
}

/// All errors that can arise from loading or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML error for manifests that did not come from a file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("daemon {0:?} is declared more than once")]
    DuplicateDaemon(String),

    #[error("daemon {daemon:?}: program {name:?} is declared more than once")]
    DuplicateProgram { daemon: String, name: String },

    #[error("daemon {daemon:?}: group {name:?} is declared more than once")]
    DuplicateGroup { daemon: String, name: String },

    #[error("daemon {daemon:?}: program {program:?} names group {group:?}, which is not declared in this daemon")]
    UnknownParentGroup {
        daemon: String,
        program: String,
        group: String,
    },

    #[error("daemon {daemon:?}: {entity} has an empty {field}")]
    EmptyField {
        daemon: String,
        entity: String,
        field: &'static str,
    },

    /// A name that cannot be used as a file name stem or supervisor section name.
    #[error("daemon {daemon:?}: {entity} name {name:?} may only contain letters, digits, '.', '_', '-' and '@', and must not start with '.'")]
    InvalidName {
        daemon: String,
        entity: &'static str,
        name: String,
    },

    #[error("daemon {daemon:?}: {source}")]
    Endpoint {
        daemon: String,
        #[source]
        source: EndpointError,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
