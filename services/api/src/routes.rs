use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use move_pricing::pricing::store::{BackupStore, HistoryStore, RuleStore};
use move_pricing::pricing::{pricing_router, PricingService};

pub(crate) fn with_pricing_routes<R, H, B>(service: Arc<PricingService<R, H, B>>) -> axum::Router
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    pricing_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "move-pricing-api" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    if state.readiness.load(std::sync::atomic::Ordering::Relaxed) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{build_pricing_service, seed_rule_set};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    use move_pricing::pricing::domain::{InputContext, ServiceType};

    #[tokio::test]
    async fn seeded_estimate_prices_a_weekend_move() {
        let service = build_pricing_service();
        seed_rule_set(&service).expect("seed rules");
        let router = with_pricing_routes(service);

        let context = InputContext {
            service_type: ServiceType::LocalMove,
            move_date: NaiveDate::from_ymd_opt(2026, 7, 11).expect("valid date"),
            base_price: 1000.0,
            base_labor_cost: 400.0,
            distance_km: 25.0,
            is_weekend: true,
            ..InputContext::default()
        };

        let response = router
            .oneshot(
                Request::post("/api/v1/pricing/estimate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&context).expect("serialize context"),
                    ))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
        assert_eq!(
            payload
                .pointer("/totals/totalPrice")
                .and_then(serde_json::Value::as_f64),
            Some(1150.0)
        );
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(payload) = healthcheck().await;
        assert_eq!(
            payload,
            json!({ "status": "ok", "service": "move-pricing-api" })
        );
    }
}
