//! Definition loading error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading an execution environment definition.
///
/// Once a [`crate::definition::Definition`] has been constructed, generation
/// itself does not produce these; missing optional inputs downgrade to
/// warnings and everything else surfaces as plain I/O context.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("could not read definition file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("definition file {path} is not valid YAML: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("definition must be a mapping, not {0}")]
    NotAMapping(&'static str),

    #[error("missing top-level 'version' key")]
    MissingVersion,

    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("failed to materialize inline dependency content: {0}")]
    Scratch(#[source] std::io::Error),
}
