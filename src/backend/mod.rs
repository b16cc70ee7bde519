mod gemini;

pub use gemini::GeminiBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::documents::DocumentHandle;

/// Processing state of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Uploading,
    Processing,
    Ready,
    Failed,
}

/// A document uploaded to the backend and not yet released
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDocument {
    /// Backend resource name, used to poll and release
    pub name: String,
    /// Reference passed to generation requests
    pub uri: String,
    pub mime_type: String,
    pub state: DocumentState,
}

/// A generation request, optionally grounded on an uploaded document
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub document: Option<&'a PendingDocument>,
    pub prompt: &'a str,
    /// Overrides the backend's default temperature
    pub temperature: Option<f32>,
}

impl<'a> GenerateRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        GenerateRequest {
            document: None,
            prompt,
            temperature: None,
        }
    }

    pub fn with_document(document: &'a PendingDocument, prompt: &'a str) -> Self {
        GenerateRequest {
            document: Some(document),
            prompt,
            temperature: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// The four operations the pipeline needs from an inference service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Get the backend name (e.g., "gemini")
    fn backend_name(&self) -> &str;

    /// Submit a document for asynchronous processing
    async fn upload(&self, document: &DocumentHandle) -> Result<PendingDocument, BackendError>;

    /// Current processing state of an uploaded document
    async fn poll_state(&self, document: &PendingDocument) -> Result<DocumentState, BackendError>;

    /// Run a generation request and return the raw text response
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, BackendError>;

    /// Free the remote storage held for a document
    async fn release(&self, document: &PendingDocument) -> Result<(), BackendError>;
}
