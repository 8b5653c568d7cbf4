use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, InputContext, RuleDraft, RuleId, RuleSetDocument, RuleUpdate};
use super::service::{PricingService, PricingServiceError};
use super::store::{BackupStore, HistoryStore, RuleStore, StoreError};

/// Router builder exposing the estimate endpoint and the rule administration
/// surface.
pub fn pricing_router<R, H, B>(service: Arc<PricingService<R, H, B>>) -> Router
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    Router::new()
        .route("/api/v1/pricing/estimate", post(estimate_handler::<R, H, B>))
        .route(
            "/api/v1/pricing/rules",
            get(list_rules_handler::<R, H, B>).post(create_rule_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules/:rule_id",
            get(get_rule_handler::<R, H, B>)
                .put(update_rule_handler::<R, H, B>)
                .delete(delete_rule_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules/:rule_id/activate",
            put(activate_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules/:rule_id/deactivate",
            put(deactivate_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules/:rule_id/history",
            get(history_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules-export",
            post(export_handler::<R, H, B>),
        )
        .route(
            "/api/v1/pricing/rules-import",
            post(import_handler::<R, H, B>),
        )
        .route("/api/v1/pricing/rules-test", post(test_rule_handler::<R, H, B>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub rule: RuleDraft,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    pub rule: RuleUpdate,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRuleRequest {
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub document: RuleSetDocument,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRuleRequest {
    pub rule: RuleDraft,
    #[serde(default)]
    pub test_data: Option<InputContext>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub(crate) async fn estimate_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    axum::Json(context): axum::Json<InputContext>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    match service.estimate(&context) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_rule_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    axum::Json(request): axum::Json<CreateRuleRequest>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let actor = request.actor.unwrap_or_default();
    match service.create_rule(request.rule, &actor) {
        Ok(rule) => (StatusCode::CREATED, axum::Json(rule)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_rules_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    match service.list_active_rules() {
        Ok(rules) => (StatusCode::OK, axum::Json(rules)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_rule_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    match service.get_rule(&RuleId(rule_id)) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_rule_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
    axum::Json(request): axum::Json<UpdateRuleRequest>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let actor = request.actor.unwrap_or_default();
    match service.update_rule(&RuleId(rule_id), request.rule, &actor) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_rule_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
    body: Option<axum::Json<DeleteRuleRequest>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let request = body.map(|axum::Json(request)| request).unwrap_or(DeleteRuleRequest {
        actor: None,
        reason: None,
    });
    let actor = request.actor.unwrap_or_default();
    match service.delete_rule(&RuleId(rule_id), &actor, request.reason) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn activate_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    set_active(service, rule_id, true, body).await
}

pub(crate) async fn deactivate_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    set_active(service, rule_id, false, body).await
}

async fn set_active<R, H, B>(
    service: Arc<PricingService<R, H, B>>,
    rule_id: String,
    active: bool,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let actor = body
        .and_then(|axum::Json(request)| request.actor)
        .unwrap_or_default();
    match service.set_rule_active(&RuleId(rule_id), active, &actor) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    Path(rule_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    match service.rule_history(&RuleId(rule_id), query.limit) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    body: Option<axum::Json<ActorRequest>>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let actor = body
        .and_then(|axum::Json(request)| request.actor)
        .unwrap_or_default();
    match service.export_rules(&actor) {
        Ok(document) => (StatusCode::OK, axum::Json(document)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn import_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    axum::Json(request): axum::Json<ImportRequest>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let actor = request.actor.unwrap_or_default();
    match service.import_rules(request.document, &actor) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn test_rule_handler<R, H, B>(
    State(service): State<Arc<PricingService<R, H, B>>>,
    axum::Json(request): axum::Json<TestRuleRequest>,
) -> Response
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    let rule = request.rule.into_rule(&Actor::system(), chrono::Utc::now());
    let result = service.test_rule(&rule, request.test_data);
    (StatusCode::OK, axum::Json(result)).into_response()
}

fn error_response(error: PricingServiceError) -> Response {
    let status = match &error {
        PricingServiceError::Validation(_) | PricingServiceError::ImportRejected { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PricingServiceError::Conflict(_) => StatusCode::CONFLICT,
        PricingServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        PricingServiceError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
        PricingServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        PricingServiceError::Store(StoreError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
