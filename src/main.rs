//! `nutrimatch <product name> [brand]`: one lookup, facts printed as JSON.

use std::process::ExitCode;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use nutrimatch::cancellation::deadline_token;
use nutrimatch::{build_service, init_tracing, Config, LookupError, LookupRequest};

/// Upper bound on one lookup, rate-limiter queueing and retries included.
const LOOKUP_DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(product_name) = args.next() else {
        eprintln!("usage: nutrimatch <product name> [brand]");
        return ExitCode::from(2);
    };
    let mut request = LookupRequest::new(product_name);
    if let Some(brand) = args.next() {
        request = request.with_brand(brand);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let shutdown = CancellationToken::new();
    let service = match build_service(&config, &shutdown) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "failed to start");
            return ExitCode::from(2);
        }
    };

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let cancel = deadline_token(&shutdown, LOOKUP_DEADLINE);
    let outcome = service.lookup(&request, &cancel).await;
    shutdown.cancel();

    let facts = match outcome {
        Ok(facts) => facts,
        Err(LookupError::LowConfidence { facts, threshold }) => {
            warn!(
                confidence = facts.confidence,
                threshold, "low confidence match, verify manually"
            );
            eprintln!(
                "warning: match confidence {:.1} is below {:.1}; verify manually",
                facts.confidence, threshold
            );
            *facts
        }
        Err(e) => {
            error!(error = %e, "lookup failed");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&facts) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to encode result");
            ExitCode::FAILURE
        }
    }
}
