pub mod parse;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::sleep;

use crate::backend::{BackendError, DocumentState, GenerateRequest, InferenceBackend, PendingDocument};
use crate::config::PollingConfig;
use crate::documents::DocumentHandle;
use crate::model::{OffersByStore, Store};
use crate::prompt::build_flyer_prompt;

pub use parse::ParseError;

/// Why a flyer contributed no offers
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("upload failed: {0}")]
    Upload(#[source] BackendError),

    #[error("polling failed: {0}")]
    Poll(#[source] BackendError),

    #[error("document not ready after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    #[error("backend failed to process the document")]
    RemoteFailed,

    #[error("extraction request failed: {0}")]
    Generate(#[source] BackendError),

    #[error("unparsable response: {0}")]
    Parse(#[from] ParseError),
}

/// Poll until the document is ready, at most `polling.max_attempts` times
async fn wait_until_ready(
    backend: &dyn InferenceBackend,
    document: &mut PendingDocument,
    polling: &PollingConfig,
) -> Result<(), ExtractionError> {
    if document.state == DocumentState::Ready {
        return Ok(());
    }

    for attempt in 1..=polling.max_attempts {
        let state = backend
            .poll_state(document)
            .await
            .map_err(ExtractionError::Poll)?;
        document.state = state;

        debug!(
            "{} is {:?} (attempt {}/{})",
            document.name, document.state, attempt, polling.max_attempts
        );

        match document.state {
            DocumentState::Ready => return Ok(()),
            DocumentState::Failed => return Err(ExtractionError::RemoteFailed),
            DocumentState::Uploading | DocumentState::Processing => {}
        }

        // Sleep only if there is another attempt left
        if attempt < polling.max_attempts {
            sleep(polling.interval()).await;
        }
    }

    Err(ExtractionError::PollTimeout {
        attempts: polling.max_attempts,
    })
}

async fn extract_uploaded(
    backend: &dyn InferenceBackend,
    document: &mut PendingDocument,
    store_name: &str,
    polling: &PollingConfig,
) -> Result<Store, ExtractionError> {
    wait_until_ready(backend, document, polling).await?;

    let prompt = build_flyer_prompt(store_name);
    let response = backend
        .generate(GenerateRequest::with_document(document, &prompt))
        .await
        .map_err(ExtractionError::Generate)?;

    let offers = parse::parse_offers(&response, store_name)?;
    Ok(Store {
        name: store_name.to_string(),
        offers,
    })
}

/// Extract the offers of a single flyer.
///
/// Remote storage is released whether or not extraction succeeds.
pub async fn extract_store(
    backend: &dyn InferenceBackend,
    document: &DocumentHandle,
    polling: &PollingConfig,
) -> Result<Store, ExtractionError> {
    let mut pending = backend
        .upload(document)
        .await
        .map_err(ExtractionError::Upload)?;
    debug!("Uploaded {} as {}", document.path.display(), pending.name);

    let result = extract_uploaded(backend, &mut pending, &document.store_name, polling).await;

    if let Err(e) = backend.release(&pending).await {
        warn!("Failed to release {}: {}", pending.name, e);
    }

    result
}

/// Extract offers from every flyer, one at a time.
///
/// A flyer that fails at any step is logged and left out; the batch
/// always completes.
pub async fn extract_offers(
    backend: &dyn InferenceBackend,
    documents: &[DocumentHandle],
    polling: &PollingConfig,
) -> OffersByStore {
    let mut offers = OffersByStore::new();

    for document in documents {
        info!("Analyzing flyer: {}", document.store_name);
        match extract_store(backend, document, polling).await {
            Ok(store) => {
                info!("Found {} offers for {}", store.offers.len(), store.name);
                offers.insert(store.name, store.offers);
            }
            Err(e) => {
                warn!("Skipping flyer {}: {}", document.store_name, e);
            }
        }
    }

    offers
}
