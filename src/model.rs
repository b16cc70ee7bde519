use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Offers keyed by store name
pub type OffersByStore = BTreeMap<String, Vec<Offer>>;

/// One priced product entry attributed to a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub name: String,
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "deserialize_price"
    )]
    pub price: Decimal,
}

impl Offer {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Offer {
            name: name.into(),
            price,
        }
    }
}

/// The offers extracted from a single flyer
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub name: String,
    pub offers: Vec<Offer>,
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_price(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid price: {}", value)))
}

/// Parse a price from a JSON number or a loosely formatted string.
///
/// Strings may carry a currency symbol and use either `,` or `.` as the
/// decimal separator ("1,99 €", "€ 2.49", "1.299,00").
pub fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_str(&n.to_string()),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
                .collect();
            let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
                (Some(comma), Some(dot)) if comma > dot => {
                    cleaned.replace('.', "").replace(',', ".")
                }
                (Some(_), Some(_)) => cleaned.replace(',', ""),
                (Some(_), None) => cleaned.replace(',', "."),
                _ => cleaned,
            };
            decimal_from_str(&normalized)
        }
        _ => None,
    }
}

fn decimal_from_str(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// A recipe as stored in a corpus bucket.
///
/// Category and meal slot are not part of the payload: they are the bucket
/// the recipe is filed under. Fields other than `title` and `ingredients`
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reasons a recipe payload is rejected at the load/import boundary
#[derive(Error, Debug, PartialEq)]
pub enum InvalidRecipe {
    #[error("recipe is not a JSON object")]
    NotAnObject,

    #[error("recipe has no title")]
    MissingTitle,

    #[error("recipe ingredients must be a list of strings")]
    InvalidIngredients,
}

impl Recipe {
    pub fn new(title: impl Into<String>, ingredients: Vec<String>) -> Self {
        Recipe {
            title: title.into(),
            ingredients,
            extra: Map::new(),
        }
    }

    /// Key used for duplicate detection inside a bucket
    pub fn title_key(&self) -> String {
        self.title.to_lowercase()
    }

    /// Validate an untyped recipe payload
    pub fn from_value(value: &Value) -> Result<Self, InvalidRecipe> {
        let object = value.as_object().ok_or(InvalidRecipe::NotAnObject)?;

        let title = object
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or(InvalidRecipe::MissingTitle)?
            .to_string();

        let ingredients = match object.get("ingredients") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|i| i.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
                .ok_or(InvalidRecipe::InvalidIngredients)?,
            Some(_) => return Err(InvalidRecipe::InvalidIngredients),
        };

        let extra = object
            .iter()
            .filter(|(k, _)| *k != "title" && *k != "ingredients")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Recipe {
            title,
            ingredients,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_price_number() {
        assert_eq!(parse_price(&json!(0.99)), Decimal::from_str("0.99").ok());
        assert_eq!(parse_price(&json!(3)), Some(Decimal::from(3)));
    }

    #[test]
    fn test_parse_price_strings() {
        assert_eq!(parse_price(&json!("1,99 €")), Decimal::from_str("1.99").ok());
        assert_eq!(parse_price(&json!("€ 2.49")), Decimal::from_str("2.49").ok());
        assert_eq!(
            parse_price(&json!("1.299,00")),
            Decimal::from_str("1299.00").ok()
        );
        assert_eq!(parse_price(&json!("n/a")), None);
        assert_eq!(parse_price(&json!(null)), None);
    }

    #[test]
    fn test_offer_serializes_price_as_number() {
        let offer = Offer::new("Pasta", Decimal::from_str("0.89").unwrap());
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json, json!({"name": "Pasta", "price": 0.89}));
    }

    #[test]
    fn test_offer_deserializes_string_price() {
        let offer: Offer = serde_json::from_value(json!({"name": "Latte", "price": "1,19"})).unwrap();
        assert_eq!(offer.price, Decimal::from_str("1.19").unwrap());
    }

    #[test]
    fn test_recipe_from_value_keeps_extra_fields() {
        let recipe = Recipe::from_value(&json!({
            "title": "Caponata",
            "ingredients": ["Melanzane", "Sedano"],
            "desc": "Agrodolce"
        }))
        .unwrap();

        assert_eq!(recipe.title, "Caponata");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.extra.get("desc"), Some(&json!("Agrodolce")));
    }

    #[test]
    fn test_recipe_from_value_rejects_malformed() {
        assert_eq!(
            Recipe::from_value(&json!("Pasta")),
            Err(InvalidRecipe::NotAnObject)
        );
        assert_eq!(
            Recipe::from_value(&json!({"title": "  "})),
            Err(InvalidRecipe::MissingTitle)
        );
        assert_eq!(
            Recipe::from_value(&json!({"title": "Pasta", "ingredients": "Pasta"})),
            Err(InvalidRecipe::InvalidIngredients)
        );
        assert_eq!(
            Recipe::from_value(&json!({"title": "Pasta", "ingredients": [1, 2]})),
            Err(InvalidRecipe::InvalidIngredients)
        );
    }

    #[test]
    fn test_recipe_without_ingredients_is_accepted() {
        let recipe = Recipe::from_value(&json!({"title": "Frutta"})).unwrap();
        assert!(recipe.ingredients.is_empty());
    }
}
