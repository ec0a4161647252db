use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use betcache_storage::{CacheStore, StorageError};
use betcache_types::Address;
use betcache_watcher::{
    BroadcastFanout, FanoutStats, Indexer, MembershipReconciler, ReconcileReport, SweepReport,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::types::*;

pub struct ApiState {
    pub cache: CacheStore,
    pub reconciler: Arc<MembershipReconciler>,
    pub fanout: Arc<BroadcastFanout>,
    pub factory_address: Address,
}

impl ApiState {
    pub fn from_indexer(indexer: &Indexer) -> Self {
        Self {
            cache: indexer.cache().clone(),
            reconciler: indexer.reconciler().clone(),
            fanout: indexer.fanout().clone(),
            factory_address: indexer.config().factory_address,
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn storage_error(e: StorageError) -> ApiError {
    error!(error = %e, "storage read failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "StorageError", e.to_string())
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, "InvalidAddress", format!("{}: {}", raw, e))
        })
}

fn non_empty_query(request: &SearchRequest) -> Result<&str, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "InvalidQuery",
            "Search query must not be empty",
        ));
    }
    Ok(query)
}

pub async fn root(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({
        "message": "Sports Betting Platform API",
        "factory_address": state.factory_address,
    }))
}

pub async fn health_check(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let registry = state.cache.registry();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Ok(Json(HealthResponse {
        status: "healthy",
        timestamp,
        last_processed_block: state.cache.checkpoint().map_err(storage_error)?,
        tournaments: registry.tournaments().map_err(storage_error)?.len(),
        groups: registry.groups().map_err(storage_error)?.len(),
        websocket: state.fanout.stats(),
    }))
}

pub async fn list_tournaments(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<TournamentResponse>>, ApiError> {
    let records = state.cache.all_tournaments().map_err(storage_error)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn get_tournament(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<TournamentResponse>, ApiError> {
    let address = parse_address(&address)?;
    state
        .cache
        .get_tournament(&address)
        .map_err(storage_error)?
        .map(|record| Json(record.into()))
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "TournamentNotFound",
                "Tournament not found",
            )
        })
}

pub async fn search_tournaments(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<TournamentResponse>>, ApiError> {
    let query = non_empty_query(&request)?;
    let records = state.cache.search_tournaments(query).map_err(storage_error)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn tournament_groups(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let address = parse_address(&address)?;
    let records = state
        .cache
        .groups_for_tournament(&address)
        .map_err(storage_error)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn list_groups(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let records = state.cache.all_groups().map_err(storage_error)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn get_group(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<GroupResponse>, ApiError> {
    let address = parse_address(&address)?;
    state
        .cache
        .get_group(&address)
        .map_err(storage_error)?
        .map(|record| Json(record.into()))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "GroupNotFound", "Group not found"))
}

pub async fn search_groups(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let query = non_empty_query(&request)?;
    let records = state.cache.search_groups(query).map_err(storage_error)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn user_groups(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<UserGroupsResponse>, ApiError> {
    let user = parse_address(&address)?;
    let records = state.cache.groups_for_user(&user).map_err(storage_error)?;
    Ok(Json(UserGroupsResponse {
        user,
        groups: records.into_iter().map(Into::into).collect(),
    }))
}

pub async fn reconcile_group(
    State(state): State<Arc<ApiState>>,
    Path(group): Path<String>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let group = parse_address(&group)?;
    info!(group = %group, "manual reconciliation requested");
    state
        .reconciler
        .reconcile_group(&group)
        .await
        .map(Json)
        .map_err(|e| {
            error!(group = %group, error = %e, "manual reconciliation failed");
            api_error(StatusCode::BAD_GATEWAY, "ReconciliationFailed", format!("{:#}", e))
        })
}

pub async fn reconcile_all(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SweepReport>, ApiError> {
    info!("manual reconciliation sweep requested");
    state.reconciler.reconcile_all().await.map(Json).map_err(|e| {
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "ReconciliationFailed", format!("{:#}", e))
    })
}

pub async fn verify_membership(
    State(state): State<Arc<ApiState>>,
    Path((user, group)): Path<(String, String)>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let user = parse_address(&user)?;
    let group = parse_address(&group)?;
    let outcome = state
        .reconciler
        .verify_membership(&user, &group)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, "VerificationFailed", format!("{:#}", e)))?;
    Ok(Json(VerifyResponse {
        user,
        group,
        outcome,
    }))
}

pub async fn ws_info(State(state): State<Arc<ApiState>>) -> Json<FanoutStats> {
    Json(state.fanout.stats())
}
