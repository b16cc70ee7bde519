use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SpesaError;

/// Environment variable holding the inference backend credential
pub const API_KEY_ENV: &str = "GEMINI_KEY";

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Where the weekly snapshot is read from and written to
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Inference backend settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Document readiness polling
    #[serde(default)]
    pub polling: PollingConfig,
    /// Flyer discovery
    #[serde(default)]
    pub flyers: FlyersConfig,
    /// User recipe submissions discovery
    #[serde(default)]
    pub submissions: SubmissionsConfig,
    /// AI recipe generation
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Configuration for the inference backend
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Model identifier (e.g., "gemini-1.5-flash")
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL for the API endpoint (for proxies and tests)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for authentication (can also be set via GEMINI_KEY)
    pub api_key: Option<String>,
    /// Temperature for extraction requests (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
        }
    }
}

impl BackendConfig {
    /// Resolve the credential: config first, then the environment
    pub fn resolve_api_key(&self) -> Result<String, SpesaError> {
        let non_blank = |key: &String| !key.trim().is_empty();
        self.api_key
            .clone()
            .filter(non_blank)
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(non_blank))
            .ok_or_else(|| SpesaError::MissingCredential(API_KEY_ENV.to_string()))
    }
}

/// Bounded polling while an uploaded document is being processed.
/// The effective timeout is `max_attempts * interval_ms`.
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_attempts(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlyersConfig {
    /// Directories tried in order; the first existing one is used
    #[serde(default = "default_flyer_paths")]
    pub search_paths: Vec<PathBuf>,
    /// File extension of flyer documents, matched case-insensitively
    #[serde(default = "default_flyer_extension")]
    pub extension: String,
}

impl Default for FlyersConfig {
    fn default() -> Self {
        Self {
            search_paths: default_flyer_paths(),
            extension: default_flyer_extension(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmissionsConfig {
    /// Directories tried in order; the first existing one is used
    #[serde(default = "default_submission_paths")]
    pub search_paths: Vec<PathBuf>,
}

impl Default for SubmissionsConfig {
    fn default() -> Self {
        Self {
            search_paths: default_submission_paths(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// Whether new recipes are requested from the backend
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Temperature for recipe generation
    #[serde(default = "default_generator_temperature")]
    pub temperature: f32,
    /// Diet categories to generate recipes for
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Meal slots to generate recipes for
    #[serde(default = "default_meal_slots")]
    pub meal_slots: Vec<String>,
    /// Recipes requested per category
    #[serde(default = "default_recipes_per_category")]
    pub recipes_per_category: u32,
    /// Maximum number of offer products suggested as ingredients
    #[serde(default = "default_ingredient_hint_size")]
    pub ingredient_hint_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: default_generator_temperature(),
            categories: default_categories(),
            meal_slots: default_meal_slots(),
            recipes_per_category: default_recipes_per_category(),
            ingredient_hint_size: default_ingredient_hint_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            backend: BackendConfig::default(),
            polling: PollingConfig::default(),
            flyers: FlyersConfig::default(),
            submissions: SubmissionsConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

// Default value functions
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("dati_settimanali.json")
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_flyer_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("volantini"), PathBuf::from("spesa/volantini")]
}

fn default_flyer_extension() -> String {
    "pdf".to_string()
}

fn default_submission_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("ricette_utenti"),
        PathBuf::from("spesa/ricette_utenti"),
    ]
}

fn default_true() -> bool {
    true
}

fn default_generator_temperature() -> f32 {
    0.9
}

fn default_categories() -> Vec<String> {
    ["mediterranean", "vegetarian", "world", "gluten_free"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_meal_slots() -> Vec<String> {
    crate::corpus::MEAL_SLOTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_recipes_per_category() -> u32 {
    3
}

fn default_ingredient_hint_size() -> usize {
    10
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with SPESA__ prefix
    /// 2. The given file, or spesa.toml in the current directory
    /// 3. Default values
    ///
    /// Environment variable format: SPESA__POLLING__MAX_ATTEMPTS
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        load_config(path)
    }
}

/// Load configuration from file and environment variables
///
/// An explicitly given file must exist; the default `spesa.toml` is optional.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name("spesa").required(false),
    };

    let settings = Config::builder()
        .add_source(file)
        // Use double underscore for nested: SPESA__BACKEND__MODEL
        .add_source(
            Environment::with_prefix("SPESA")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        assert_eq!(default_model(), "gemini-1.5-flash");
        assert_eq!(default_poll_interval_ms(), 2000);
        assert_eq!(default_poll_attempts(), 30);
        assert_eq!(default_generator_temperature(), 0.9);
        assert_eq!(default_ingredient_hint_size(), 10);
        assert_eq!(
            default_meal_slots(),
            vec!["breakfast", "lunch", "snack", "dinner"]
        );
    }

    #[test]
    fn test_polling_interval() {
        let polling = PollingConfig {
            interval_ms: 250,
            max_attempts: 4,
        };
        assert_eq!(polling.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
snapshot_path = "out/weekly.json"

[backend]
model = "gemini-2.5-flash"
api_key = "from-file"

[polling]
max_attempts = 5

[generator]
enabled = false
categories = ["vegan"]
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();

        assert_eq!(config.snapshot_path, PathBuf::from("out/weekly.json"));
        assert_eq!(config.backend.model, "gemini-2.5-flash");
        assert_eq!(config.backend.base_url, default_base_url());
        assert_eq!(config.polling.max_attempts, 5);
        assert_eq!(config.polling.interval_ms, 2000);
        assert!(!config.generator.enabled);
        assert_eq!(config.generator.categories, vec!["vegan"]);
        assert_eq!(config.generator.meal_slots.len(), 4);
        assert_eq!(config.flyers.extension, "pdf");
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let result = load_config(Some("/definitely/not/here/spesa.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_from_config_wins() {
        let backend = BackendConfig {
            api_key: Some("configured".to_string()),
            ..BackendConfig::default()
        };
        assert_eq!(backend.resolve_api_key().unwrap(), "configured");
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let backend = BackendConfig {
            api_key: Some("   ".to_string()),
            ..BackendConfig::default()
        };
        if std::env::var(API_KEY_ENV).is_err() {
            let result = backend.resolve_api_key();
            assert!(matches!(result, Err(SpesaError::MissingCredential(_))));
        }
    }
}
