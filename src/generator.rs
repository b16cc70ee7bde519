use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::backend::{BackendError, GenerateRequest, InferenceBackend};
use crate::config::GeneratorConfig;
use crate::corpus::{Corpus, CorpusError};
use crate::flyers::parse::{extract_json, ParseError};
use crate::model::OffersByStore;
use crate::prompt::build_recipe_prompt;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Backend(#[from] BackendError),

    #[error("unparsable response: {0}")]
    Parse(#[from] ParseError),

    #[error("response is not a recipe corpus: {0}")]
    Corpus(#[from] CorpusError),
}

/// Product names suggested to the generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngredientHint {
    names: Vec<String>,
}

impl IngredientHint {
    pub fn new(names: Vec<String>) -> Self {
        IngredientHint { names }
    }

    /// Random sample of at most `max` distinct product names on offer
    pub fn sample(offers: &OffersByStore, max: usize) -> Self {
        Self::sample_with(offers, max, &mut rand::thread_rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(offers: &OffersByStore, max: usize, rng: &mut R) -> Self {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = offers
            .values()
            .flatten()
            .map(|offer| &offer.name)
            .filter(|name| !name.trim().is_empty() && seen.insert(name.to_lowercase()))
            .collect();

        let names = distinct
            .choose_multiple(rng, max)
            .map(|name| name.to_string())
            .collect();
        IngredientHint { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Source of freshly invented recipes
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    /// Return a corpus-shaped fragment of candidate recipes
    async fn generate(&self, hint: &IngredientHint) -> Result<Corpus, GenerationError>;
}

/// Generates recipes by prompting an inference backend
pub struct BackendRecipeGenerator {
    backend: Arc<dyn InferenceBackend>,
    config: GeneratorConfig,
}

impl BackendRecipeGenerator {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: GeneratorConfig) -> Self {
        BackendRecipeGenerator { backend, config }
    }
}

/// Parse a model reply into a validated fragment
pub fn parse_fragment(text: &str) -> Result<Corpus, GenerationError> {
    let value = extract_json(text)?;
    let (fragment, quarantined) = Corpus::from_value(&value)?;
    if quarantined > 0 {
        warn!("Quarantined {} malformed generated entries", quarantined);
    }
    Ok(fragment)
}

#[async_trait]
impl RecipeGenerator for BackendRecipeGenerator {
    async fn generate(&self, hint: &IngredientHint) -> Result<Corpus, GenerationError> {
        info!(
            "Generating recipes with {} ({} suggested ingredients)",
            self.backend.backend_name(),
            hint.names().len()
        );

        let prompt = build_recipe_prompt(
            &self.config.categories,
            &self.config.meal_slots,
            self.config.recipes_per_category,
            hint.names(),
        );
        let response = self
            .backend
            .generate(GenerateRequest::text(&prompt).temperature(self.config.temperature))
            .await?;

        parse_fragment(&response)
    }
}
