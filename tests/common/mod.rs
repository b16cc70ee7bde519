#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use spesa::backend::{
    BackendError, DocumentState, GenerateRequest, InferenceBackend, PendingDocument,
};
use spesa::documents::DocumentHandle;

/// How the scripted backend treats one flyer, keyed by store name
#[derive(Debug, Clone)]
pub enum FlyerScript {
    /// Becomes ready after `polls` polls and answers with `response`
    Ready { polls: u32, response: String },
    /// Stays in processing forever
    NeverReady,
    /// Reports a failed processing state
    RemoteFailed,
    /// Rejects the upload
    UploadFails,
}

#[derive(Default)]
pub struct ScriptedBackend {
    flyers: HashMap<String, FlyerScript>,
    recipes: Option<String>,
    polls: Mutex<HashMap<String, u32>>,
    pub released: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flyer(mut self, store: &str, script: FlyerScript) -> Self {
        self.flyers.insert(store.to_string(), script);
        self
    }

    pub fn ready(self, store: &str, response: &str) -> Self {
        self.flyer(
            store,
            FlyerScript::Ready {
                polls: 1,
                response: response.to_string(),
            },
        )
    }

    /// Text answered to prompts without a document
    pub fn recipes(mut self, response: &str) -> Self {
        self.recipes = Some(response.to_string());
        self
    }

    pub fn poll_count(&self, store: &str) -> u32 {
        let polls = self.polls.lock().unwrap();
        polls.get(&format!("files/{}", store)).copied().unwrap_or(0)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    fn script(&self, name: &str) -> Option<&FlyerScript> {
        self.flyers.get(name.trim_start_matches("files/"))
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    async fn upload(&self, document: &DocumentHandle) -> Result<PendingDocument, BackendError> {
        if let Some(FlyerScript::UploadFails) | None = self.flyers.get(&document.store_name) {
            return Err(BackendError::Api {
                status: 500,
                message: "upload rejected".to_string(),
            });
        }

        Ok(PendingDocument {
            name: format!("files/{}", document.store_name),
            uri: format!("scripted://{}", document.store_name),
            mime_type: document.mime_type().to_string(),
            state: DocumentState::Uploading,
        })
    }

    async fn poll_state(&self, document: &PendingDocument) -> Result<DocumentState, BackendError> {
        let count = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(document.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(match self.script(&document.name) {
            Some(FlyerScript::Ready { polls, .. }) if count >= *polls => DocumentState::Ready,
            Some(FlyerScript::RemoteFailed) => DocumentState::Failed,
            _ => DocumentState::Processing,
        })
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());

        match request.document {
            Some(document) => match self.script(&document.name) {
                Some(FlyerScript::Ready { response, .. }) => Ok(response.clone()),
                _ => Err(BackendError::MalformedResponse("not ready".to_string())),
            },
            None => self
                .recipes
                .clone()
                .ok_or_else(|| BackendError::MalformedResponse("no recipes".to_string())),
        }
    }

    async fn release(&self, document: &PendingDocument) -> Result<(), BackendError> {
        self.released.lock().unwrap().push(document.name.clone());
        Ok(())
    }
}

/// Create empty flyer files and return their handles
pub fn write_flyers(dir: &Path, file_names: &[&str]) -> Vec<DocumentHandle> {
    std::fs::create_dir_all(dir).unwrap();
    file_names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, b"%PDF-1.4").unwrap();
            DocumentHandle::new(path)
        })
        .collect()
}
