//! Recipe corpus: diet category → meal slot → recipes.
//!
//! Within one `(category, meal_slot)` bucket no two recipes share a title
//! (compared case-insensitively). The corpus only grows: merging and
//! importing append new titles and silently drop titles already present.

mod import;
mod store;

pub use import::{import_user_recipes, ImportStats};
pub use store::{load_corpus, load_offers, read_snapshot, save_snapshot, seed_corpus, Snapshot};

use std::collections::{BTreeMap, HashSet};

use log::warn;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::Recipe;

/// Conventional meal slots, created for every new category
pub const MEAL_SLOTS: [&str; 4] = ["breakfast", "lunch", "snack", "dinner"];

/// Errors reading a corpus or snapshot
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot has no '{0}' key")]
    MissingKey(&'static str),

    #[error("{0} is not a JSON object")]
    NotAnObject(&'static str),
}

/// Outcome of merging a fragment into a corpus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub skipped: usize,
}

/// Recipes keyed by category, then meal slot.
///
/// Only serialized; loading goes through [`Corpus::from_value`], which
/// validates every entry and keeps bucket titles unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Corpus {
    categories: BTreeMap<String, BTreeMap<String, Vec<Recipe>>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recipes across all buckets
    pub fn recipe_count(&self) -> usize {
        self.categories
            .values()
            .flat_map(|slots| slots.values())
            .map(Vec::len)
            .sum()
    }

    /// True when the corpus holds no recipes at all
    pub fn is_empty(&self) -> bool {
        self.recipe_count() == 0
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn meal_slots(&self, category: &str) -> impl Iterator<Item = &str> {
        self.categories
            .get(category)
            .into_iter()
            .flat_map(|slots| slots.keys().map(String::as_str))
    }

    pub fn bucket(&self, category: &str, meal_slot: &str) -> Option<&[Recipe]> {
        self.categories
            .get(category)
            .and_then(|slots| slots.get(meal_slot))
            .map(Vec::as_slice)
    }

    /// Add one recipe to a bucket, creating the category (with every
    /// conventional slot) and the bucket as needed.
    ///
    /// Returns `false` when the bucket already holds the title.
    pub fn insert(&mut self, category: &str, meal_slot: &str, recipe: Recipe) -> bool {
        let bucket = self.ensure_bucket(category, meal_slot);
        let key = recipe.title_key();
        if bucket.iter().any(|existing| existing.title_key() == key) {
            return false;
        }
        bucket.push(recipe);
        true
    }

    /// Merge a corpus-shaped fragment into this corpus.
    ///
    /// Candidates are considered in fragment order; the first occurrence of
    /// a title in a bucket wins, both against existing recipes and against
    /// earlier candidates of the same fragment.
    pub fn merge(&mut self, fragment: Corpus) -> MergeStats {
        let mut stats = MergeStats::default();

        for (category, slots) in fragment.categories {
            self.ensure_category(&category);
            for (meal_slot, candidates) in slots {
                let bucket = self.ensure_bucket(&category, &meal_slot);
                let mut seen: HashSet<String> = bucket.iter().map(Recipe::title_key).collect();

                for candidate in candidates {
                    if seen.insert(candidate.title_key()) {
                        bucket.push(candidate);
                        stats.added += 1;
                    } else {
                        stats.skipped += 1;
                    }
                }
            }
        }

        stats
    }

    fn ensure_category(&mut self, category: &str) -> &mut BTreeMap<String, Vec<Recipe>> {
        self.categories
            .entry(category.to_string())
            .or_insert_with(|| {
                MEAL_SLOTS
                    .iter()
                    .map(|slot| (slot.to_string(), Vec::new()))
                    .collect()
            })
    }

    fn ensure_bucket(&mut self, category: &str, meal_slot: &str) -> &mut Vec<Recipe> {
        self.ensure_category(category)
            .entry(meal_slot.to_string())
            .or_default()
    }

    /// Build a corpus from untyped JSON, validating every recipe.
    ///
    /// Malformed categories, buckets and recipes are quarantined: they are
    /// logged and left out, and their number is returned alongside the
    /// corpus. Only a non-object top level is an error.
    pub fn from_value(value: &Value) -> Result<(Corpus, usize), CorpusError> {
        let categories = value
            .as_object()
            .ok_or(CorpusError::NotAnObject("recipe corpus"))?;

        let mut corpus = Corpus::new();
        let mut quarantined = 0;

        for (category, slots) in categories {
            let Some(slots) = slots.as_object() else {
                warn!("Quarantined category '{}': not an object", category);
                quarantined += 1;
                continue;
            };

            let target = corpus.categories.entry(category.clone()).or_default();
            for (meal_slot, recipes) in slots {
                let Some(recipes) = recipes.as_array() else {
                    warn!(
                        "Quarantined bucket ({}, {}): not a list",
                        category, meal_slot
                    );
                    quarantined += 1;
                    continue;
                };

                let bucket = target.entry(meal_slot.clone()).or_default();
                for raw in recipes {
                    match Recipe::from_value(raw) {
                        Ok(recipe) => {
                            let key = recipe.title_key();
                            if bucket.iter().any(|r| r.title_key() == key) {
                                warn!(
                                    "Dropped duplicate '{}' in ({}, {})",
                                    recipe.title, category, meal_slot
                                );
                                quarantined += 1;
                            } else {
                                bucket.push(recipe);
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Quarantined recipe in ({}, {}): {}",
                                category, meal_slot, e
                            );
                            quarantined += 1;
                        }
                    }
                }
            }
        }

        Ok((corpus, quarantined))
    }
}
