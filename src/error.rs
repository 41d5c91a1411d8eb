//! Error types and handling for the document sealing library
//!
//! Each concern owns a `thiserror` enum; [`Error`] aggregates them for callers
//! that drive the whole pipeline.

use std::{io, path::PathBuf, result::Result as StdResult};

use thiserror::Error;

use crate::encryption::EncryptionError;

/// Custom result type for crate-level operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for docseal operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Template structure error: {0}")]
    TemplateStructure(#[from] TemplateStructureError),

    #[error("Merge field error: {0}")]
    MergeField(#[from] MergeFieldError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// -------------------- Sub-Error Categories --------------------

/// The template archive or its body part cannot be used. Fatal for a render.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TemplateStructureError {
    #[error("Required part not found in archive: {0}")]
    MissingPart(String),

    #[error("Malformed archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Part {0} is not valid UTF-8")]
    Encoding(String),

    #[error("Archive I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Template tags and submitted data do not line up.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MergeFieldError {
    #[error("Unresolved merge fields: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    #[error("Section '{0}' is opened but never closed")]
    UnclosedSection(String),

    #[error("Section '{0}' is closed but was never opened")]
    UnexpectedClose(String),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("Invalid template identifier: {0}")]
    UnknownTemplate(String),

    #[error("Template file missing: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Document conversion failed: {0}")]
    Conversion(String),

    #[error("Document conversion timed out after {0}s")]
    ConversionTimeout(u64),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
