use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};

use super::{BackendError, DocumentState, GenerateRequest, InferenceBackend, PendingDocument};
use crate::config::BackendConfig;
use crate::documents::DocumentHandle;
use crate::error::SpesaError;

/// Google Gemini over its REST API: Files API for documents,
/// `generateContent` for generation
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiBackend {
    /// Create a new Gemini backend from configuration
    pub fn new(config: &BackendConfig) -> Result<Self, SpesaError> {
        let api_key = config.resolve_api_key()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(BackendError::from)?;

        Ok(GeminiBackend {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(api_key: String, base_url: String, model: String) -> Self {
        GeminiBackend {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.2,
            max_tokens: 8192,
        }
    }

    /// Authenticated request; the key travels in a header so it never
    /// shows up in URLs carried by transport errors
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("x-goog-api-key", &self.api_key)
    }
}

fn parse_state(state: Option<&str>) -> DocumentState {
    match state {
        Some("ACTIVE") => DocumentState::Ready,
        Some("PROCESSING") => DocumentState::Processing,
        Some("FAILED") => DocumentState::Failed,
        _ => DocumentState::Uploading,
    }
}

fn parse_file(file: &Value) -> Result<PendingDocument, BackendError> {
    let field = |key: &str| {
        file[key]
            .as_str()
            .map(String::from)
            .ok_or_else(|| BackendError::MalformedResponse(format!("file has no '{}'", key)))
    };

    Ok(PendingDocument {
        name: field("name")?,
        uri: field("uri")?,
        mime_type: file["mimeType"]
            .as_str()
            .unwrap_or("application/octet-stream")
            .to_string(),
        state: parse_state(file["state"].as_str()),
    })
}

/// Turn a non-2xx response into an API error carrying the service message
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or(body);

    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn backend_name(&self) -> &str {
        "gemini"
    }

    async fn upload(&self, document: &DocumentHandle) -> Result<PendingDocument, BackendError> {
        let bytes = tokio::fs::read(&document.path).await?;
        let mime_type = document.mime_type();

        // Resumable upload: open a session, then send the bytes and finalize
        let start = self
            .request(Method::POST, "upload/v1beta/files")
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": document.store_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BackendError::MalformedResponse("missing upload URL".to_string()))?
            .to_string();

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        let response_body: Value = check_status(response).await?.json().await?;
        debug!("Gemini upload response: {:?}", response_body);

        parse_file(&response_body["file"])
    }

    async fn poll_state(&self, document: &PendingDocument) -> Result<DocumentState, BackendError> {
        let response = self
            .request(Method::GET, &format!("v1beta/{}", document.name))
            .send()
            .await?;

        let response_body: Value = check_status(response).await?.json().await?;
        debug!("Gemini file state: {:?}", response_body["state"]);

        Ok(parse_state(response_body["state"].as_str()))
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, BackendError> {
        let mut parts = Vec::new();
        if let Some(document) = request.document {
            parts.push(json!({
                "fileData": {
                    "mimeType": document.mime_type,
                    "fileUri": document.uri
                }
            }));
        }
        parts.push(json!({ "text": request.prompt }));

        let response = self
            .request(
                Method::POST,
                &format!("v1beta/models/{}:generateContent", self.model),
            )
            .json(&json!({
                "contents": [{ "parts": parts }],
                "generationConfig": {
                    "temperature": request.temperature.unwrap_or(self.temperature),
                    "maxOutputTokens": self.max_tokens
                }
            }))
            .send()
            .await?;

        let response_body: Value = check_status(response).await?.json().await?;
        debug!("Gemini response: {:?}", response_body);

        // Check for API error response
        if let Some(error) = response_body.get("error") {
            return Err(BackendError::Api {
                status: error["code"].as_u64().unwrap_or(0) as u16,
                message: error["message"]
                    .as_str()
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        let text: String = response_body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(BackendError::MalformedResponse(format!(
                "no text in Gemini response: {}",
                response_body
            )));
        }

        Ok(text)
    }

    async fn release(&self, document: &PendingDocument) -> Result<(), BackendError> {
        let response = self
            .request(Method::DELETE, &format!("v1beta/{}", document.name))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn backend(server: &Server) -> GeminiBackend {
        GeminiBackend::with_base_url(
            "test-key".to_string(),
            server.url(),
            "gemini-1.5-flash".to_string(),
        )
    }

    fn pending() -> PendingDocument {
        PendingDocument {
            name: "files/abc123".to_string(),
            uri: "https://example.com/files/abc123".to_string(),
            mime_type: "application/pdf".to_string(),
            state: DocumentState::Processing,
        }
    }

    #[tokio::test]
    async fn test_backend_name() {
        let config = BackendConfig {
            api_key: Some("test-key".to_string()),
            ..BackendConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        assert_eq!(backend.backend_name(), "gemini");
    }

    #[tokio::test]
    async fn test_upload_resumable_flow() {
        let mut server = Server::new_async().await;
        let session_url = format!("{}/upload-session/1", server.url());

        let start = server
            .mock("POST", "/upload/v1beta/files")
            .match_header("x-goog-api-key", "test-key")
            .match_header("X-Goog-Upload-Command", "start")
            .match_header("X-Goog-Upload-Header-Content-Type", "application/pdf")
            .with_status(200)
            .with_header("x-goog-upload-url", &session_url)
            .create_async()
            .await;
        let finalize = server
            .mock("POST", "/upload-session/1")
            .match_header("X-Goog-Upload-Command", "upload, finalize")
            .match_body("%PDF-1.4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"file": {"name": "files/abc123", "uri": "https://example.com/files/abc123",
                    "mimeType": "application/pdf", "state": "PROCESSING"}}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lidl.pdf");
        std::fs::write(&path, "%PDF-1.4").unwrap();

        let uploaded = backend(&server)
            .upload(&DocumentHandle::new(path))
            .await
            .unwrap();

        assert_eq!(uploaded, pending());
        start.assert_async().await;
        finalize.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_missing_session_url() {
        let mut server = Server::new_async().await;
        let _start = server
            .mock("POST", "/upload/v1beta/files")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coop.pdf");
        std::fs::write(&path, "%PDF").unwrap();

        let result = backend(&server).upload(&DocumentHandle::new(path)).await;
        assert!(matches!(result, Err(BackendError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let server = Server::new_async().await;
        let result = backend(&server)
            .upload(&DocumentHandle::new("/no/such/flyer.pdf"))
            .await;
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[tokio::test]
    async fn test_poll_state() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1beta/files/abc123")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "files/abc123", "state": "ACTIVE"}"#)
            .create_async()
            .await;

        let state = backend(&server).poll_state(&pending()).await.unwrap();
        assert_eq!(state, DocumentState::Ready);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_key() {
        let backend = GeminiBackend::with_base_url(
            "SUPERSECRETKEY".to_string(),
            "http://127.0.0.1:1".to_string(),
            "gemini-1.5-flash".to_string(),
        );

        let error = backend.poll_state(&pending()).await.unwrap_err();
        assert!(matches!(error, BackendError::Http(_)));
        assert!(!error.to_string().contains("SUPERSECRETKEY"));
        assert!(!format!("{:?}", error).contains("SUPERSECRETKEY"));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state(Some("ACTIVE")), DocumentState::Ready);
        assert_eq!(parse_state(Some("PROCESSING")), DocumentState::Processing);
        assert_eq!(parse_state(Some("FAILED")), DocumentState::Failed);
        assert_eq!(parse_state(Some("STATE_UNSPECIFIED")), DocumentState::Uploading);
        assert_eq!(parse_state(None), DocumentState::Uploading);
    }

    #[tokio::test]
    async fn test_generate_with_document() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"parts": [
                    {"fileData": {"fileUri": "https://example.com/files/abc123"}},
                    {"text": "Extract offers"}
                ]}],
                "generationConfig": {"temperature": 0.5}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates": [{"content": {"parts": [
                    {"text": "{\"Lidl\": "}, {"text": "[]}"}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let document = pending();
        let text = backend(&server)
            .generate(GenerateRequest::with_document(&document, "Extract offers").temperature(0.5))
            .await
            .unwrap();

        assert_eq!(text, r#"{"Lidl": []}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"code": 400, "message": "API key not valid"}}"#)
            .create_async()
            .await;

        let result = backend(&server)
            .generate(GenerateRequest::text("Invent recipes"))
            .await;

        match result {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_empty_candidates() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let result = backend(&server)
            .generate(GenerateRequest::text("Invent recipes"))
            .await;
        assert!(matches!(result, Err(BackendError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_release() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v1beta/files/abc123")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        backend(&server).release(&pending()).await.unwrap();
        mock.assert_async().await;
    }
}
