use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use super::{Corpus, CorpusError};
use crate::error::SpesaError;
use crate::model::OffersByStore;

/// Format of the snapshot's `last_updated` field
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

const CORPUS_KEY: &str = "recipe_corpus";
const OFFERS_KEY: &str = "offers_by_store";

/// The persisted weekly document
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub last_updated: String,
    pub offers_by_store: &'a OffersByStore,
    pub recipe_corpus: &'a Corpus,
}

/// Corpus used when no usable snapshot exists
pub fn seed_corpus() -> Corpus {
    let seed = json!({
        "mediterranean": {
            "lunch": [{"title": "Pasta Pomodoro", "ingredients": ["Pasta", "Pomodoro"]}]
        },
        "gluten_free": {
            "lunch": [{"title": "Risotto Zafferano", "ingredients": ["Riso", "Zafferano"]}]
        }
    });

    Corpus::from_value(&seed)
        .map(|(corpus, _)| corpus)
        .unwrap_or_default()
}

/// Read the previous snapshot as untyped JSON
pub fn read_snapshot(path: &Path) -> Result<Value, CorpusError> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(CorpusError::NotAnObject("snapshot"));
    }
    Ok(value)
}

fn read_corpus(path: &Path) -> Result<Corpus, CorpusError> {
    let snapshot = read_snapshot(path)?;
    let section = snapshot
        .get(CORPUS_KEY)
        .ok_or(CorpusError::MissingKey(CORPUS_KEY))?;

    let (corpus, quarantined) = Corpus::from_value(section)?;
    if quarantined > 0 {
        warn!(
            "Quarantined {} malformed entries while loading {}",
            quarantined,
            path.display()
        );
    }
    Ok(corpus)
}

/// Load the corpus from the previous snapshot, or the seed corpus if the
/// snapshot is missing, unreadable or has no corpus section.
pub fn load_corpus(path: &Path) -> Corpus {
    match read_corpus(path) {
        Ok(corpus) => {
            info!(
                "Loaded {} recipes from {}",
                corpus.recipe_count(),
                path.display()
            );
            corpus
        }
        Err(e) => {
            warn!(
                "Using seed corpus, could not load {}: {}",
                path.display(),
                e
            );
            seed_corpus()
        }
    }
}

/// Load the offers of the previous snapshot, empty on any failure
pub fn load_offers(path: &Path) -> OffersByStore {
    let offers = read_snapshot(path).and_then(|snapshot| {
        let section = snapshot
            .get(OFFERS_KEY)
            .cloned()
            .ok_or(CorpusError::MissingKey(OFFERS_KEY))?;
        Ok(serde_json::from_value::<OffersByStore>(section)?)
    });

    offers.unwrap_or_else(|e| {
        warn!("No previous offers in {}: {}", path.display(), e);
        OffersByStore::new()
    })
}

/// Write the snapshot, replacing any previous one
pub fn save_snapshot(
    path: &Path,
    corpus: &Corpus,
    offers: &OffersByStore,
    timestamp: DateTime<Local>,
) -> Result<(), SpesaError> {
    let snapshot = Snapshot {
        last_updated: timestamp.format(TIMESTAMP_FORMAT).to_string(),
        offers_by_store: offers,
        recipe_corpus: corpus,
    };
    let body = serde_json::to_string_pretty(&snapshot)?;

    let persist_error = |source: std::io::Error| SpesaError::PersistError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_error)?;
    }
    fs::write(path, body).map_err(persist_error)?;

    info!("Snapshot saved to {}", path.display());
    Ok(())
}
