use crate::cli::ServeArgs;
use crate::infra::{build_pricing_service, seed_rule_set, AppState};
use crate::routes::with_pricing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use move_pricing::config::AppConfig;
use move_pricing::error::AppError;
use move_pricing::telemetry;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let pricing_service = build_pricing_service();
    if !args.no_seed {
        match seed_rule_set(&pricing_service) {
            Ok(seeded) => info!(seeded, "starter rule set loaded"),
            Err(err) => warn!(%err, "starter rule set not loaded; serving an empty rule set"),
        }
    }

    let app = with_pricing_routes(pricing_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "pricing rule engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
