//! Lookup orchestration: cache, preprocess, search, match, map, store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cache::CacheStore;
use super::mapper::to_nutrition_facts;
use super::matching::{MatchConfig, MatchingService};
use super::normalize::{cache_key, id_cache_key};
use super::preprocess::preprocess;
use super::{CandidateRecord, FoodSearch, LookupRequest, NutritionFacts, Origin};
use crate::error::{LookupError, MatchError};
use crate::metrics::{metric_names, MetricsRegistry, RequestIds, TimingSpan};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Confidence reported for a lookup by identifier.
const EXACT_ID_CONFIDENCE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Zero means [`DEFAULT_CACHE_TTL`].
    pub cache_ttl: Duration,
    pub matching: MatchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            matching: MatchConfig::default(),
        }
    }
}

pub struct NutritionService {
    cache: Arc<dyn CacheStore<NutritionFacts>>,
    search: Arc<dyn FoodSearch>,
    matcher: MatchingService,
    cache_ttl: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl NutritionService {
    pub fn new(
        cache: Arc<dyn CacheStore<NutritionFacts>>,
        search: Arc<dyn FoodSearch>,
        config: ServiceConfig,
    ) -> Self {
        let cache_ttl = if config.cache_ttl.is_zero() {
            DEFAULT_CACHE_TTL
        } else {
            config.cache_ttl
        };
        Self {
            cache,
            search,
            matcher: MatchingService::new(config.matching),
            cache_ttl,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    pub fn min_confidence(&self) -> f64 {
        self.matcher.min_confidence()
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Resolve a product description to nutrition facts.
    ///
    /// A match under the confidence threshold comes back as
    /// [`LookupError::LowConfidence`] with the facts attached; it is not cached.
    pub async fn lookup(
        &self,
        request: &LookupRequest,
        cancel: &CancellationToken,
    ) -> Result<NutritionFacts, LookupError> {
        let ids = RequestIds::new();
        let span = info_span!(
            "lookup",
            lookup_id = %ids.lookup_id,
            product = %request.product_name,
            brand = request.brand_str(),
        );
        self.lookup_inner(request, cancel).instrument(span).await
    }

    async fn lookup_inner(
        &self,
        request: &LookupRequest,
        cancel: &CancellationToken,
    ) -> Result<NutritionFacts, LookupError> {
        if request.product_name.trim().is_empty() {
            return Err(LookupError::InvalidRequest("product name is empty".into()));
        }
        if cancel.is_cancelled() {
            return Err(LookupError::Cancelled);
        }

        let total = self.timer(metric_names::LOOKUP_CACHE_HIT);
        let key = cache_key(request);
        if let Some(mut facts) = self.cached(&key).await {
            facts.origin = Origin::Cache;
            info!(external_id = %facts.external_id, "cache hit");
            finish(total);
            return Ok(facts);
        }
        debug!(key = %key, "cache miss");
        let total = self.timer(metric_names::LOOKUP_EXTERNAL);

        let query = preprocess(&request.product_name, request.brand_str());
        if query.is_empty() {
            return Err(LookupError::InvalidRequest(format!(
                "nothing searchable left in {:?}",
                request.product_name
            )));
        }

        let search_timer = self.timer(metric_names::EXTERNAL_SEARCH);
        let candidates = self.search.search(&query, cancel).await;
        finish(search_timer);
        let candidates = candidates?;
        if candidates.is_empty() {
            return Err(LookupError::NotFound);
        }

        let match_timer = self.timer(metric_names::MATCH_SCORING);
        let outcome = self.matcher.find_best_match(request, &candidates);
        finish(match_timer);

        match outcome {
            Ok(best) => {
                let record = matched_record(&candidates, &best.external_id)?;
                let mut facts = to_nutrition_facts(record, best.score);
                facts.cached_at = Some(Utc::now());
                self.store(&key, &facts).await;
                info!(
                    external_id = %facts.external_id,
                    description = %facts.product_name,
                    confidence = facts.confidence,
                    "lookup matched"
                );
                finish(total);
                Ok(facts)
            }
            Err(MatchError::LowConfidence { best, threshold }) => {
                let record = matched_record(&candidates, &best.external_id)?;
                let facts = to_nutrition_facts(record, best.score);
                warn!(
                    external_id = %facts.external_id,
                    description = %facts.product_name,
                    score = best.score,
                    threshold,
                    "low confidence match, not cached"
                );
                finish(total);
                Err(LookupError::LowConfidence {
                    facts: Box::new(facts),
                    threshold,
                })
            }
            Err(MatchError::NotFound) => Err(LookupError::NotFound),
            Err(MatchError::InvalidRequest) => {
                Err(LookupError::InvalidRequest("product name is empty".into()))
            }
        }
    }

    /// Fetch a record directly by its external identifier, bypassing matching.
    pub async fn lookup_by_id(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<NutritionFacts, LookupError> {
        let ids = RequestIds::new();
        let span = info_span!("lookup_by_id", lookup_id = %ids.lookup_id, external_id);
        async {
            let external_id = external_id.trim();
            if external_id.is_empty() {
                return Err(LookupError::InvalidRequest("external id is empty".into()));
            }

            let key = id_cache_key(external_id);
            if let Some(mut facts) = self.cached(&key).await {
                facts.origin = Origin::Cache;
                info!("cache hit");
                return Ok(facts);
            }

            let record = self.search.food_details(external_id, cancel).await?;
            let mut facts = to_nutrition_facts(&record, EXACT_ID_CONFIDENCE);
            facts.cached_at = Some(Utc::now());
            self.store(&key, &facts).await;
            info!(description = %facts.product_name, "fetched by id");
            Ok(facts)
        }
        .instrument(span)
        .await
    }

    /// Cache read; backend failures degrade to a miss.
    async fn cached(&self, key: &str) -> Option<NutritionFacts> {
        match self.cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cache write; failures are logged and do not fail the lookup.
    async fn store(&self, key: &str, facts: &NutritionFacts) {
        if let Err(e) = self.cache.set(key, facts, self.cache_ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    fn timer(&self, name: &'static str) -> Option<TimingSpan> {
        self.metrics.as_ref().map(|m| m.span(name))
    }
}

fn finish(timer: Option<TimingSpan>) {
    if let Some(t) = timer {
        t.finish();
    }
}

fn matched_record<'a>(
    candidates: &'a [CandidateRecord],
    external_id: &str,
) -> Result<&'a CandidateRecord, LookupError> {
    candidates
        .iter()
        .find(|c| c.external_id == external_id)
        .ok_or(LookupError::NotFound)
}
