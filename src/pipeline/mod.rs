pub mod credentials;
pub mod generation;
pub mod limiter;
pub mod prompt;
pub mod render;
pub mod vertex;

pub use credentials::*;
pub use generation::*;
pub use limiter::*;
pub use prompt::*;
pub use render::*;
pub use vertex::*;

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Vertex AI quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Vertex AI returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Vertex AI credentials are not configured")]
    NotConfigured,
}

impl ModelError {
    /// Only quota exhaustion is worth waiting out.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, ModelError::QuotaExhausted(_))
    }
}

impl From<CredentialError> for ModelError {
    fn from(err: CredentialError) -> Self {
        ModelError::Credentials(err.to_string())
    }
}

/// Hosted generative model abstraction (allows mocking)
pub trait GenerativeModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

impl<T: GenerativeModel + ?Sized> GenerativeModel for Arc<T> {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).generate(prompt)
    }
}
