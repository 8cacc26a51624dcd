//! Nutrition lookup pipeline.
//! Query preprocessing, candidate scoring, the external food database client
//! and the TTL cache, orchestrated by [`service::NutritionService`].

pub mod cache;
pub mod fdc;
pub mod mapper;
pub mod matching;
pub mod normalize;
pub mod preprocess;
pub mod rate_limit;
pub mod service;
pub mod sqlite_cache;
pub mod vocabulary;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// Product description handed over by page extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl LookupRequest {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            brand: None,
            size: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// Brand as a plain string; absent and empty are the same thing.
    pub fn brand_str(&self) -> &str {
        self.brand.as_deref().unwrap_or("")
    }
}

/// Provenance class of an external record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Branded,
    Survey,
    Foundation,
    Other,
}

impl SourceType {
    /// Map the database's `dataType` tag.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.trim() {
            "Branded" => SourceType::Branded,
            "Foundation" => SourceType::Foundation,
            t if t.starts_with("Survey") => SourceType::Survey,
            _ => SourceType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientSample {
    pub nutrient_code: u32,
    pub value: f64,
}

/// One external database entry considered as a possible match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub external_id: String,
    pub description: String,
    pub source_type: SourceType,
    pub nutrient_samples: Vec<NutrientSample>,
}

/// Token with its scoring weight. Lives for one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedToken {
    pub text: String,
    pub weight: f64,
}

/// Best candidate for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub external_id: String,
    pub description: String,
    /// 0-100.
    pub score: f64,
    pub matched_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    ExternalDb,
    Cache,
}

/// Externally visible lookup result.
/// `confidence` is always the score of the match that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionFacts {
    pub external_id: String,
    pub product_name: String,
    pub serving_size: String,
    pub serving_size_unit: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbohydrate_g: f64,
    pub total_fat_g: f64,
    pub confidence: f64,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

/// Food database backend (adapter for the live client and test doubles).
#[async_trait]
pub trait FoodSearch: Send + Sync {
    /// Search by free text. Zero results is `SearchError::NotFound`.
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError>;

    /// Fetch one record by its identifier.
    async fn food_details(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateRecord, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_from_data_type() {
        assert_eq!(SourceType::from_data_type("Branded"), SourceType::Branded);
        assert_eq!(SourceType::from_data_type("Survey (FNDDS)"), SourceType::Survey);
        assert_eq!(SourceType::from_data_type("Foundation"), SourceType::Foundation);
        assert_eq!(SourceType::from_data_type("SR Legacy"), SourceType::Other);
        assert_eq!(SourceType::from_data_type(""), SourceType::Other);
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: LookupRequest =
            serde_json::from_str(r#"{"productName":"Whole Milk","brand":"Great Value"}"#).unwrap();
        assert_eq!(req.product_name, "Whole Milk");
        assert_eq!(req.brand_str(), "Great Value");
        assert!(req.size.is_none());
        assert_eq!(LookupRequest::new("x").brand_str(), "");
    }
}
