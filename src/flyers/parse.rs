//! Lenient parsing of model output into offers.
//!
//! Model replies wrap JSON in code fences, prose or tags. Only the first
//! top-level balanced `{...}` or `[...]` span that is valid JSON is parsed;
//! a malformed span is skipped whole, never searched for inner JSON.

use serde_json::Value;
use thiserror::Error;

use crate::model::Offer;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no JSON object or array in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response has no store key")]
    NoStore,

    #[error("cannot choose a store among keys {0:?}")]
    AmbiguousStore(Vec<String>),

    #[error("offers are not a list")]
    NotAList,

    #[error("offer #{index} is invalid: {reason}")]
    InvalidOffer { index: usize, reason: String },
}

/// Remove markdown code fence markers
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// End offset (exclusive) of the balanced span opening at `start`, if any.
/// Brackets inside string literals are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Top-level balanced `{...}`/`[...]` spans, left to right.
///
/// Scanning resumes after the end of each span, so a span nested inside
/// another is never yielded on its own.
pub fn json_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[cursor..].find(|c| matches!(c, '{' | '[')) {
            let start = cursor + offset;
            match balanced_end(text, start) {
                Some(end) => {
                    cursor = end;
                    return Some(&text[start..end]);
                }
                None => cursor = start + 1,
            }
        }
        None
    })
}

/// Extract the first JSON value embedded in a model reply
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    let cleaned = strip_code_fences(text);
    let mut first_error = None;

    for span in json_spans(&cleaned) {
        match serde_json::from_str::<Value>(span) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(ParseError::Json(e)),
        None => Err(ParseError::NoJson),
    }
}

/// Pick the offer list for `expected_store` out of a parsed reply.
///
/// The reply should be keyed by the store name, but models paraphrase it:
/// an exact key wins, then a case-insensitive one, then the only key
/// present. A bare list is taken as the store's offers.
fn select_offers(value: Value, expected_store: &str) -> Result<Value, ParseError> {
    let mut object = match value {
        Value::Object(object) => object,
        list @ Value::Array(_) => return Ok(list),
        _ => return Err(ParseError::NotAList),
    };

    if let Some(offers) = object.remove(expected_store) {
        return Ok(offers);
    }

    let expected = expected_store.to_lowercase();
    let key = object
        .keys()
        .find(|k| k.to_lowercase() == expected)
        .cloned();
    if let Some(offers) = key.and_then(|k| object.remove(&k)) {
        return Ok(offers);
    }

    match object.len() {
        0 => Err(ParseError::NoStore),
        1 => Ok(object
            .into_iter()
            .next()
            .map(|(_, offers)| offers)
            .unwrap_or_default()),
        _ => Err(ParseError::AmbiguousStore(object.keys().cloned().collect())),
    }
}

/// Parse a raw model reply into the offers of one store.
///
/// Any invalid entry fails the whole reply.
pub fn parse_offers(text: &str, expected_store: &str) -> Result<Vec<Offer>, ParseError> {
    let value = extract_json(text)?;
    let offers = select_offers(value, expected_store)?;

    let Value::Array(entries) = offers else {
        return Err(ParseError::NotAList);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<Offer>(entry).map_err(|e| ParseError::InvalidOffer {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}
