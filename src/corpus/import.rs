use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::Corpus;
use crate::documents::list_files_with_extension;
use crate::model::{InvalidRecipe, Recipe};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    /// Submission files read
    pub files: usize,
    /// Files skipped as malformed
    pub skipped_files: usize,
    /// Recipes added to a bucket
    pub added: usize,
    /// Target buckets that already held the title
    pub duplicates: usize,
}

#[derive(Error, Debug)]
enum SubmissionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no recipe payload")]
    MissingRecipe,

    #[error("invalid recipe: {0}")]
    InvalidRecipe(#[from] InvalidRecipe),

    #[error("no category or meal type declared")]
    NoTargets,
}

/// Raw shape of a submission file. `category`/`categories` and
/// `type`/`types` each accept a string or a list of strings.
#[derive(Debug, Deserialize)]
struct RawSubmission {
    category: Option<Value>,
    categories: Option<Value>,
    #[serde(rename = "type")]
    meal_type: Option<Value>,
    types: Option<Value>,
    recipe: Option<Value>,
}

#[derive(Debug)]
struct Submission {
    categories: Vec<String>,
    meal_slots: Vec<String>,
    recipe: Recipe,
}

fn string_list(values: &[Option<&Value>]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for value in values.iter().flatten().copied() {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            if let Some(s) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                if !result.iter().any(|existing| existing == s) {
                    result.push(s.to_string());
                }
            }
        }
    }
    result
}

fn parse_submission(raw: &str) -> Result<Submission, SubmissionError> {
    let submission: RawSubmission = serde_json::from_str(raw)?;

    let recipe = submission
        .recipe
        .as_ref()
        .filter(|r| !r.is_null())
        .ok_or(SubmissionError::MissingRecipe)?;
    let recipe = Recipe::from_value(recipe)?;

    let categories = string_list(&[
        submission.categories.as_ref(),
        submission.category.as_ref(),
    ]);
    let meal_slots = string_list(&[submission.types.as_ref(), submission.meal_type.as_ref()]);

    if categories.is_empty() || meal_slots.is_empty() {
        return Err(SubmissionError::NoTargets);
    }

    Ok(Submission {
        categories,
        meal_slots,
        recipe,
    })
}

fn read_submission(path: &Path) -> Result<Submission, SubmissionError> {
    let raw = fs::read_to_string(path)?;
    parse_submission(&raw)
}

/// Fold every `*.json` submission in `submissions_dir` into the corpus.
///
/// Each declared `(category, type)` pair receives its own copy of the
/// recipe, deduplicated by title within that bucket. Malformed files are
/// skipped without stopping the batch.
pub fn import_user_recipes(corpus: &mut Corpus, submissions_dir: &Path) -> ImportStats {
    let mut stats = ImportStats::default();

    let files = match list_files_with_extension(submissions_dir, "json") {
        Ok(files) => files,
        Err(e) => {
            info!(
                "No user submissions read from {}: {}",
                submissions_dir.display(),
                e
            );
            return stats;
        }
    };

    for path in files {
        stats.files += 1;
        let submission = match read_submission(&path) {
            Ok(submission) => submission,
            Err(e) => {
                warn!("Skipping submission {}: {}", path.display(), e);
                stats.skipped_files += 1;
                continue;
            }
        };

        for category in &submission.categories {
            for meal_slot in &submission.meal_slots {
                if corpus.insert(category, meal_slot, submission.recipe.clone()) {
                    debug!(
                        "Imported '{}' into ({}, {})",
                        submission.recipe.title, category, meal_slot
                    );
                    stats.added += 1;
                } else {
                    stats.duplicates += 1;
                }
            }
        }
    }

    info!(
        "Imported {} user recipes from {} files ({} duplicates, {} skipped)",
        stats.added, stats.files, stats.duplicates, stats.skipped_files
    );
    stats
}
