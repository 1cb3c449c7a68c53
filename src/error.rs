use thiserror::Error;

/// Fatal pipeline outcomes. Degradable failures never reach this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("could not download template image {reference}: {reason}")]
    TemplateDownload { reference: String, reason: String },
    #[error("image synthesis failed: {0}")]
    Synthesis(String),
    #[error("speculative synthesis unavailable: {0}")]
    Speculative(String),
}
