use std::sync::Arc;

use chrono::Local;
use log::{info, warn};

use crate::backend::InferenceBackend;
use crate::config::AppConfig;
use crate::corpus::{import_user_recipes, load_corpus, load_offers, save_snapshot, MergeStats};
use crate::documents::{first_existing_dir, list_documents};
use crate::flyers::extract_offers;
use crate::generator::{BackendRecipeGenerator, IngredientHint, RecipeGenerator};
use crate::model::OffersByStore;
use crate::SpesaError;

/// Where this run's offers come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffersMode {
    /// Extract offers from the flyers on disk (default)
    #[default]
    Extract,
    /// Reuse the offers of the previous snapshot
    KeepPrevious,
}

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Stores with offers in the snapshot
    pub stores: usize,
    /// Offers across all stores
    pub offers: usize,
    /// User recipes added this run
    pub imported: usize,
    /// Generated recipes added this run
    pub generated: usize,
    /// Recipes in the saved corpus
    pub recipes: usize,
}

/// Builder for configuring and executing a weekly update
pub struct WeeklyUpdateBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn InferenceBackend>>,
    generator: Option<Box<dyn RecipeGenerator>>,
    offers_mode: OffersMode,
    generate: bool,
}

impl WeeklyUpdateBuilder {
    /// Set the inference backend used for flyers and, unless a generator is
    /// given, for recipe generation
    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set a custom recipe generator
    pub fn generator(mut self, generator: Box<dyn RecipeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn offers_mode(mut self, mode: OffersMode) -> Self {
        self.offers_mode = mode;
        self
    }

    /// Enable or disable recipe generation (defaults to `generator.enabled`)
    pub fn generation(mut self, enabled: bool) -> Self {
        self.generate = enabled;
        self
    }

    /// Execute the update and write the snapshot
    ///
    /// # Errors
    /// Returns `SpesaError` if:
    /// - Extraction or generation is requested without a backend
    /// - The snapshot cannot be written
    ///
    /// Flyer, submission and generation failures are logged and do not
    /// fail the run.
    pub async fn run(self) -> Result<RunSummary, SpesaError> {
        let config = self.config;

        let backend = match (self.offers_mode, self.backend) {
            (OffersMode::Extract, None) => {
                return Err(SpesaError::BuilderError(
                    "Extracting offers requires a backend. Use .backend() or OffersMode::KeepPrevious"
                        .to_string(),
                ))
            }
            (_, backend) => backend,
        };

        let generator: Option<Box<dyn RecipeGenerator>> = match (self.generate, self.generator) {
            (false, _) => None,
            (true, Some(generator)) => Some(generator),
            (true, None) => {
                let backend = backend.clone().ok_or_else(|| {
                    SpesaError::BuilderError(
                        "Recipe generation requires a backend or a generator".to_string(),
                    )
                })?;
                Some(Box::new(BackendRecipeGenerator::new(
                    backend,
                    config.generator.clone(),
                )))
            }
        };

        // 1. Offers
        let offers: OffersByStore = match (self.offers_mode, &backend) {
            (OffersMode::Extract, Some(backend)) => {
                let documents = list_documents(&config.flyers.search_paths, &config.flyers.extension);
                extract_offers(Arc::as_ref(backend), &documents, &config.polling).await
            }
            _ => load_offers(&config.snapshot_path),
        };

        // 2. Corpus and user submissions
        let mut corpus = load_corpus(&config.snapshot_path);
        let imported = match first_existing_dir(&config.submissions.search_paths) {
            Some(dir) => import_user_recipes(&mut corpus, dir).added,
            None => {
                info!("No user submissions directory found");
                0
            }
        };

        // 3. Generated recipes
        let generated = match generator {
            Some(generator) => {
                let hint = IngredientHint::sample(&offers, config.generator.ingredient_hint_size);
                let stats = match generator.generate(&hint).await {
                    Ok(fragment) => corpus.merge(fragment),
                    Err(e) => {
                        warn!("No new recipes this run: {}", e);
                        MergeStats::default()
                    }
                };
                info!(
                    "Merged {} generated recipes ({} duplicates dropped)",
                    stats.added, stats.skipped
                );
                stats.added
            }
            None => 0,
        };

        // 4. Snapshot
        save_snapshot(&config.snapshot_path, &corpus, &offers, Local::now())?;

        Ok(RunSummary {
            stores: offers.len(),
            offers: offers.values().map(Vec::len).sum(),
            imported,
            generated,
            recipes: corpus.recipe_count(),
        })
    }
}

/// Main entry point for the builder API
pub struct WeeklyUpdate;

impl WeeklyUpdate {
    /// Creates a new builder for a weekly update
    ///
    /// # Example
    /// ```
    /// use spesa::{AppConfig, OffersMode, WeeklyUpdate};
    ///
    /// let builder = WeeklyUpdate::builder(AppConfig::default())
    ///     .offers_mode(OffersMode::KeepPrevious)
    ///     .generation(false);
    /// ```
    pub fn builder(config: AppConfig) -> WeeklyUpdateBuilder {
        let generate = config.generator.enabled;
        WeeklyUpdateBuilder {
            config,
            backend: None,
            generator: None,
            offers_mode: OffersMode::default(),
            generate,
        }
    }
}
