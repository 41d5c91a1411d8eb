//! docseal: form templates in, encrypted documents out
//!
//! Fills office-document templates with submitted form data (merge fields,
//! row-addressed checkbox toggles and text overwrites), converts the result to
//! PDF through an external office suite and encrypts it at rest.

// Configuration and errors
pub mod config;
pub mod error;

// Placeholder data model
pub mod placeholder;

// Form-field patch engine
pub mod template;

// Symmetric encryption service
pub mod encryption;
pub mod hash_utils;

// Render, convert, encrypt
pub mod pipeline;

// Shared Utilities
pub mod utils;

// Re-exports for crate consumers
pub use config::{AppConfig, EngineConfig, KeyStoreConfig, PipelineConfig};
pub use encryption::{DecryptionError, EncryptedFile, EncryptionError, EncryptionService, KeyStore};
pub use error::{Error, MergeFieldError, PipelineError, Result, TemplateStructureError};
pub use pipeline::{DocumentConverter, OfficeConverter, SubmissionPipeline, SubmissionReceipt};
pub use placeholder::{FieldAddress, PlaceholderMap, PlaceholderValue};
pub use template::{list_form_fields, DocumentArchive, PatchEngine, RenderReport};
