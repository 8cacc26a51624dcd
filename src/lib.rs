//! nutrimatch: resolves noisy retail product descriptions to nutrition facts.
//! Library root: tracing setup and engine assembly from configuration.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod lookup;
pub mod metrics;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::{CacheBackend, Config, ConfigError};
pub use error::{InitError, LookupError};
pub use lookup::service::NutritionService;
pub use lookup::{LookupRequest, NutritionFacts, Origin};

use lookup::cache::{CacheStore, MemoryCache};
use lookup::fdc::FoodDataClient;
use lookup::sqlite_cache::SqliteCache;
use lookup::FoodSearch;
use metrics::MetricsRegistry;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `NUTRIMATCH_LOG_FORMAT=json` switches to JSON lines. Logs go to
/// stderr. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nutrimatch=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let json = std::env::var("NUTRIMATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Build the lookup service against the live food database.
/// Must be called inside a Tokio runtime; background cache maintenance stops
/// when `shutdown` fires.
pub fn build_service(
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<NutritionService, InitError> {
    config.validate()?;
    let client = FoodDataClient::new(config.fdc_config()?)?;
    build_service_with(config, Arc::new(client), shutdown)
}

/// Same as [`build_service`] with a caller-supplied search backend.
pub fn build_service_with(
    config: &Config,
    search: Arc<dyn FoodSearch>,
    shutdown: &CancellationToken,
) -> Result<NutritionService, InitError> {
    config.validate()?;

    let cache: Arc<dyn CacheStore<NutritionFacts>> = match config.cache_backend {
        CacheBackend::Memory => {
            let cache: Arc<MemoryCache<NutritionFacts>> = Arc::new(MemoryCache::new());
            cache.spawn_sweeper(config.cache_sweep_interval, shutdown.clone());
            cache
        }
        CacheBackend::Sqlite => {
            let path = config
                .cache_path
                .as_deref()
                .ok_or(ConfigError::MissingCachePath)?;
            let cache: Arc<SqliteCache<NutritionFacts>> = Arc::new(SqliteCache::open(path)?);
            cache.spawn_cleanup(config.cache_sweep_interval, shutdown.clone());
            cache
        }
    };

    info!(
        backend = ?config.cache_backend,
        ttl_secs = config.cache_ttl.as_secs(),
        min_confidence = config.min_confidence,
        fuzzy = config.fuzzy_enabled,
        "nutrition service ready"
    );

    Ok(
        NutritionService::new(cache, search, config.service_config())
            .with_metrics(Arc::new(MetricsRegistry::new())),
    )
}
