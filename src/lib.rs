pub mod backend;
pub mod builder;
pub mod config;
pub mod corpus;
pub mod documents;
pub mod error;
pub mod flyers;
pub mod generator;
pub mod model;
pub mod prompt;

use std::sync::Arc;

pub use backend::{GeminiBackend, InferenceBackend};
pub use builder::{OffersMode, RunSummary, WeeklyUpdate, WeeklyUpdateBuilder};
pub use config::AppConfig;
pub use corpus::{Corpus, MergeStats};
pub use error::SpesaError;
pub use model::{Offer, OffersByStore, Recipe, Store};

/// Run a full weekly update against the configured Gemini backend
///
/// Extracts offers from the flyers on disk, imports user submissions,
/// generates new recipes (when enabled) and writes the snapshot.
///
/// # Example
/// ```no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = spesa::AppConfig::load(None)?;
/// let summary = spesa::update_weekly_snapshot(config).await?;
/// println!("{} recipes", summary.recipes);
/// # Ok(())
/// # }
/// ```
pub async fn update_weekly_snapshot(config: AppConfig) -> Result<RunSummary, SpesaError> {
    let backend = Arc::new(GeminiBackend::new(&config.backend)?);
    WeeklyUpdate::builder(config).backend(backend).run().await
}

/// Extract offers from the flyers on disk without touching the snapshot
pub async fn extract_flyer_offers(config: &AppConfig) -> Result<OffersByStore, SpesaError> {
    let backend = GeminiBackend::new(&config.backend)?;
    let documents = documents::list_documents(&config.flyers.search_paths, &config.flyers.extension);
    Ok(flyers::extract_offers(&backend, &documents, &config.polling).await)
}
