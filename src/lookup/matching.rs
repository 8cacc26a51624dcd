//! Weighted fuzzy matching of a product query against candidate records.
//!
//! Score (0-100) = weighted token overlap scaled to 70, plus independent
//! bonuses for brand, data source and whole-query substring, capped at 100.

use std::collections::HashMap;

use tracing::debug;

use super::preprocess::preprocess;
use super::vocabulary::tokenize_weighted;
use super::{CandidateRecord, LookupRequest, MatchResult, SourceType, WeightedToken};
use crate::error::MatchError;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 40.0;
pub const DEFAULT_FUZZY_EDIT_DISTANCE: usize = 1;

/// Overlap contribution before bonuses.
pub const BASE_SCORE_MAX: f64 = 70.0;
pub const FUZZY_WEIGHT_FACTOR: f64 = 0.8;
pub const BRAND_MATCH_BONUS: f64 = 25.0;
pub const SUBSTRING_MATCH_BONUS: f64 = 10.0;
pub const BRANDED_BONUS: f64 = 10.0;
pub const SURVEY_BONUS: f64 = 5.0;
pub const FOUNDATION_BONUS: f64 = 3.0;
pub const MAX_SCORE: f64 = 100.0;

/// Tokens shorter than this never fuzzy-match.
const FUZZY_MIN_TOKEN_LEN: usize = 4;
/// The substring bonus needs a query longer than this.
const SUBSTRING_MIN_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub min_confidence: f64,
    pub fuzzy_enabled: bool,
    pub fuzzy_edit_distance: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fuzzy_enabled: true,
            fuzzy_edit_distance: DEFAULT_FUZZY_EDIT_DISTANCE,
        }
    }
}

/// Scores candidates and picks the best one. Stateless across calls.
#[derive(Debug, Clone)]
pub struct MatchingService {
    config: MatchConfig,
}

impl MatchingService {
    /// Non-positive threshold or distance falls back to the defaults.
    pub fn new(mut config: MatchConfig) -> Self {
        if config.min_confidence <= 0.0 {
            config.min_confidence = DEFAULT_MIN_CONFIDENCE;
        }
        if config.fuzzy_edit_distance == 0 {
            config.fuzzy_edit_distance = DEFAULT_FUZZY_EDIT_DISTANCE;
        }
        Self { config }
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    /// Highest scoring candidate; ties keep the first encountered.
    /// Under the threshold the match is still returned inside
    /// [`MatchError::LowConfidence`].
    pub fn find_best_match(
        &self,
        request: &LookupRequest,
        candidates: &[CandidateRecord],
    ) -> Result<MatchResult, MatchError> {
        if request.product_name.trim().is_empty() {
            return Err(MatchError::InvalidRequest);
        }
        if candidates.is_empty() {
            return Err(MatchError::NotFound);
        }

        let query = clean_query(&request.product_name);
        let brand = request.brand_str();
        debug!(query = %query, brand, candidates = candidates.len(), "matching");

        let mut best: Option<MatchResult> = None;
        for candidate in candidates {
            let (score, matched_tokens) = self.score_candidate(&query, brand, candidate);
            debug!(
                external_id = %candidate.external_id,
                description = %candidate.description,
                source = ?candidate.source_type,
                score,
                matched = ?matched_tokens,
                "candidate scored"
            );
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(MatchResult {
                    external_id: candidate.external_id.clone(),
                    description: candidate.description.clone(),
                    score,
                    matched_tokens,
                });
            }
        }

        let best = best.ok_or(MatchError::NotFound)?;
        debug!(external_id = %best.external_id, score = best.score, "best match");

        if best.score < self.config.min_confidence {
            return Err(MatchError::LowConfidence {
                best,
                threshold: self.config.min_confidence,
            });
        }
        Ok(best)
    }

    /// Score one candidate against an already cleaned query.
    pub fn score_candidate(
        &self,
        query: &str,
        brand: &str,
        candidate: &CandidateRecord,
    ) -> (f64, Vec<String>) {
        let query_tokens = tokenize_weighted(query);
        let candidate_tokens = tokenize_weighted(&candidate.description);
        if query_tokens.is_empty() || candidate_tokens.is_empty() {
            return (0.0, Vec::new());
        }

        let (base, matched) = self.weighted_similarity(&query_tokens, &candidate_tokens);
        let score = base + bonuses(query, brand, candidate);
        (score.min(MAX_SCORE), matched)
    }

    fn weighted_similarity(
        &self,
        query_tokens: &[WeightedToken],
        candidate_tokens: &[WeightedToken],
    ) -> (f64, Vec<String>) {
        let candidate_set: HashMap<&str, f64> = candidate_tokens
            .iter()
            .map(|t| (t.text.as_str(), t.weight))
            .collect();

        let mut total_weight = 0.0;
        let mut matched_weight = 0.0;
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();

        for qt in query_tokens {
            total_weight += qt.weight;
            match candidate_set.get(qt.text.as_str()) {
                Some(&cw) => {
                    matched_weight += qt.weight.max(cw);
                    matched.push(qt.text.clone());
                }
                None => unmatched.push(qt),
            }
        }

        if self.config.fuzzy_enabled {
            let threshold = self.config.fuzzy_edit_distance;
            for qt in unmatched {
                if let Some(ct) = candidate_tokens
                    .iter()
                    .find(|ct| fuzzy_token_match(&qt.text, &ct.text, threshold))
                {
                    matched_weight += qt.weight.max(ct.weight) * FUZZY_WEIGHT_FACTOR;
                    matched.push(format!("{}~{}", qt.text, ct.text));
                }
            }
        }

        if total_weight == 0.0 {
            return (0.0, Vec::new());
        }
        let base = (matched_weight / total_weight * BASE_SCORE_MAX).min(BASE_SCORE_MAX);
        (base, matched)
    }
}

/// The query text scored against candidates: the preprocessed product name
/// without the brand prepended.
pub fn clean_query(product_name: &str) -> String {
    preprocess(product_name, "")
}

fn bonuses(query: &str, brand: &str, candidate: &CandidateRecord) -> f64 {
    let description = candidate.description.to_lowercase();
    let mut bonus = 0.0;

    let brand = brand.trim();
    if !brand.is_empty() && description.contains(&brand.to_lowercase()) {
        bonus += BRAND_MATCH_BONUS;
    }

    bonus += source_bonus(candidate.source_type);

    let query = query.to_lowercase();
    if query.len() > SUBSTRING_MIN_LEN && description.contains(&query) {
        bonus += SUBSTRING_MATCH_BONUS;
    }
    bonus
}

pub fn source_bonus(source: SourceType) -> f64 {
    match source {
        SourceType::Branded => BRANDED_BONUS,
        SourceType::Survey => SURVEY_BONUS,
        SourceType::Foundation => FOUNDATION_BONUS,
        SourceType::Other => 0.0,
    }
}

/// Both tokens at least four characters, lengths within `threshold`, and
/// edit distance within `threshold`.
pub fn fuzzy_token_match(a: &str, b: &str, threshold: usize) -> bool {
    if a == b {
        return true;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la < FUZZY_MIN_TOKEN_LEN || lb < FUZZY_MIN_TOKEN_LEN {
        return false;
    }
    if la.abs_diff(lb) > threshold {
        return false;
    }
    levenshtein(a, b) <= threshold
}

/// Levenshtein distance with two rolling rows sized to the shorter input.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, description: &str, source_type: SourceType) -> CandidateRecord {
        CandidateRecord {
            external_id: id.to_string(),
            description: description.to_string(),
            source_type,
            nutrient_samples: Vec::new(),
        }
    }

    fn service() -> MatchingService {
        MatchingService::new(MatchConfig::default())
    }

    #[test]
    fn new_applies_defaults() {
        let svc = MatchingService::new(MatchConfig {
            min_confidence: 0.0,
            fuzzy_enabled: false,
            fuzzy_edit_distance: 0,
        });
        assert_eq!(svc.min_confidence(), DEFAULT_MIN_CONFIDENCE);
        assert_eq!(svc.config.fuzzy_edit_distance, DEFAULT_FUZZY_EDIT_DISTANCE);

        let svc = MatchingService::new(MatchConfig {
            min_confidence: 50.0,
            ..MatchConfig::default()
        });
        assert_eq!(svc.min_confidence(), 50.0);
    }

    #[test]
    fn empty_product_name_is_invalid() {
        let err = service()
            .find_best_match(&LookupRequest::new("  "), &[candidate("1", "Milk", SourceType::Other)])
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidRequest));
    }

    #[test]
    fn empty_candidates_is_not_found() {
        for req in [
            LookupRequest::new("Whole Milk"),
            LookupRequest::new("chocolate cake").with_brand("Betty Crocker"),
            LookupRequest::new("x").with_size("12 oz"),
        ] {
            let err = service().find_best_match(&req, &[]).unwrap_err();
            assert!(matches!(err, MatchError::NotFound), "request {req:?}");
        }
    }

    #[test]
    fn picks_branded_whole_milk() {
        let req = LookupRequest::new("Whole Milk, Vitamin D, Gallon, 128 fl oz").with_brand("Great Value");
        let candidates = [
            candidate("1", "Skim Milk", SourceType::Foundation),
            candidate("2", "Great Value Whole Milk, Vitamin D", SourceType::Branded),
            candidate("3", "Chocolate Milk", SourceType::Foundation),
        ];
        let best = service().find_best_match(&req, &candidates).unwrap();
        assert_eq!(best.external_id, "2");
        assert!(best.score >= 50.0, "score = {}", best.score);
        assert!(best.matched_tokens.contains(&"whole".to_string()));
        assert!(best.matched_tokens.contains(&"milk".to_string()));
    }

    #[test]
    fn brand_adds_exact_bonus() {
        // 70 overlap, no substring bonus, so the brand bonus is not capped away
        let cands = [candidate("1", "Tyson Chicken Strips, grilled", SourceType::Other)];
        let svc = service();
        let without = svc
            .find_best_match(&LookupRequest::new("grilled chicken"), &cands)
            .unwrap();
        let with = svc
            .find_best_match(&LookupRequest::new("grilled chicken").with_brand("Tyson"), &cands)
            .unwrap();
        assert!((with.score - without.score - BRAND_MATCH_BONUS).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_still_returns_match() {
        let svc = MatchingService::new(MatchConfig {
            min_confidence: 80.0,
            ..MatchConfig::default()
        });
        let cands = [candidate("9", "Grilled Chicken Breast", SourceType::Foundation)];
        match svc.find_best_match(&LookupRequest::new("chocolate cake"), &cands) {
            Err(MatchError::LowConfidence { best, threshold }) => {
                assert_eq!(best.external_id, "9");
                assert_eq!(threshold, 80.0);
                assert!(best.score < 80.0);
            }
            other => panic!("expected LowConfidence, got {other:?}"),
        }
    }

    #[test]
    fn ties_keep_first_candidate() {
        let cands = [
            candidate("a", "Cheddar Cheese", SourceType::Other),
            candidate("b", "Cheddar Cheese", SourceType::Other),
        ];
        let best = service()
            .find_best_match(&LookupRequest::new("cheddar cheese"), &cands)
            .unwrap();
        assert_eq!(best.external_id, "a");
    }

    #[test]
    fn exact_match_scores_full_overlap() {
        let c = candidate("1", "Whole Milk", SourceType::Other);
        let (score, matched) = service().score_candidate("whole milk", "", &c);
        // 70 overlap + 10 substring
        assert!((score - 80.0).abs() < 1e-9, "score = {score}");
        assert_eq!(matched, vec!["whole", "milk"]);
    }

    #[test]
    fn score_is_capped_at_100() {
        let c = candidate("1", "Great Value Whole Milk", SourceType::Branded);
        let (score, _) = service().score_candidate("whole milk", "Great Value", &c);
        assert_eq!(score, MAX_SCORE);
    }

    #[test]
    fn unrelated_items_score_low() {
        let c = candidate("1", "Broccoli, raw", SourceType::Other);
        let (score, matched) = service().score_candidate("chocolate cake", "", &c);
        assert_eq!(score, 0.0);
        assert!(matched.is_empty());
    }

    #[test]
    fn empty_token_sets_score_zero() {
        let svc = service();
        let (score, matched) = svc.score_candidate("12 oz", "", &candidate("1", "Milk", SourceType::Branded));
        assert_eq!(score, 0.0);
        assert!(matched.is_empty());
        let (score, _) = svc.score_candidate("milk", "", &candidate("1", "", SourceType::Branded));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn fuzzy_pass_tags_pairs() {
        let c = candidate("1", "Chicken Breast", SourceType::Other);
        let (score, matched) = service().score_candidate("chiken breast", "", &c);
        assert!(matched.contains(&"chiken~chicken".to_string()), "{matched:?}");
        assert!(matched.contains(&"breast".to_string()));
        // breast 1.0 exact, chiken~chicken max(1, 3) * 0.8 = 2.4 over total 2.0, capped
        assert!((score - BASE_SCORE_MAX).abs() < 1e-9, "score = {score}");
    }

    #[test]
    fn fuzzy_disabled_skips_near_misses() {
        let svc = MatchingService::new(MatchConfig {
            fuzzy_enabled: false,
            ..MatchConfig::default()
        });
        let c = candidate("1", "Chicken Breast", SourceType::Other);
        let (_, matched) = svc.score_candidate("chiken breast", "", &c);
        assert_eq!(matched, vec!["breast"]);
    }

    #[test]
    fn source_bonuses() {
        assert_eq!(source_bonus(SourceType::Branded), 10.0);
        assert_eq!(source_bonus(SourceType::Survey), 5.0);
        assert_eq!(source_bonus(SourceType::Foundation), 3.0);
        assert_eq!(source_bonus(SourceType::Other), 0.0);
    }

    #[test]
    fn fuzzy_token_rules() {
        assert!(fuzzy_token_match("chiken", "chicken", 1));
        assert!(fuzzy_token_match("milk", "milk", 1));
        // too short
        assert!(!fuzzy_token_match("tea", "pea", 1));
        // length gap above threshold
        assert!(!fuzzy_token_match("bread", "breaded", 1));
        assert!(fuzzy_token_match("bread", "breaded", 2));
        assert!(!fuzzy_token_match("cheese", "cherry", 1));
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("sitting", "kitten"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("café", "cafe"), 1);
    }
}
