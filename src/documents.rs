use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use log::{debug, info};

/// A flyer document found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub path: PathBuf,
    /// Store name derived from the file name
    pub store_name: String,
}

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store_name = store_name_from_path(&path);
        DocumentHandle { path, store_name }
    }

    /// MIME type sent along with the upload
    pub fn mime_type(&self) -> &'static str {
        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

/// Derive a store name from a file name: the stem with underscores turned
/// into spaces, title-cased ("lidl_SETTIMANA.pdf" → "Lidl Settimana").
pub fn store_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    title_case(&stem)
}

/// Upper-case every letter that follows a non-letter, lower-case the rest
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if previous_is_letter {
            result.extend(c.to_lowercase());
        } else {
            result.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    result
}

/// The first of `search_paths` that is an existing directory
pub fn first_existing_dir(search_paths: &[PathBuf]) -> Option<&Path> {
    search_paths
        .iter()
        .map(PathBuf::as_path)
        .find(|p| p.is_dir())
}

fn extension_matcher(extension: &str) -> Result<GlobMatcher, globset::Error> {
    let pattern = format!("*.{}", extension.trim_start_matches('.'));
    Ok(GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Files directly inside `dir` whose extension matches, case-insensitively,
/// sorted by path
pub fn list_files_with_extension(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let matcher =
        extension_matcher(extension).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Follows symlinks; dangling links are skipped
        if path.is_file() && matcher.is_match(entry.file_name()) {
            files.push(path);
        }
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

/// Documents of the first existing search path, empty when none exists
pub fn list_documents(search_paths: &[PathBuf], extension: &str) -> Vec<DocumentHandle> {
    let Some(dir) = first_existing_dir(search_paths) else {
        info!("No document directory found in {:?}", search_paths);
        return Vec::new();
    };

    match list_files_with_extension(dir, extension) {
        Ok(files) => {
            info!("Found {} documents in {}", files.len(), dir.display());
            files.into_iter().map(DocumentHandle::new).collect()
        }
        Err(e) => {
            debug!("Could not list {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}
