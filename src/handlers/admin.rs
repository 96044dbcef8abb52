use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{reference, BookingRecord, PriceEntry};
use crate::services::recovery::{self, SWEEP_BATCH};
use crate::state::AppState;

const SESSION_VALIDITY_HOURS: i64 = 24;

/// Operator auth: the static token, or a session token issued by `login`
/// within its 24h validity window.
#[allow(clippy::result_large_err)]
fn check_auth(state: &Arc<AppState>, headers: &HeaderMap) -> Result<(), Response> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or("");

    if !token.is_empty() && token == state.config.admin_token {
        return Ok(());
    }

    let session_ok = {
        let db = state.db.lock().unwrap();
        queries::session_valid(&db, token).unwrap_or(false)
    };
    if session_ok {
        return Ok(());
    }

    Err(AppError::Unauthorized.into_response())
}

// POST /api/admin/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    session_token: String,
    expires_in_hours: i64,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Response> {
    if request.token != state.config.admin_token {
        return Err(AppError::Unauthorized.into_response());
    }

    let session_token = uuid::Uuid::new_v4().to_string();
    {
        let db = state.db.lock().unwrap();
        let _ = queries::purge_expired_sessions(&db);
        queries::create_session(&db, &session_token, SESSION_VALIDITY_HOURS).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        })?;
    }

    Ok(Json(LoginResponse {
        session_token,
        expires_in_hours: SESSION_VALIDITY_HOURS,
    }))
}

// GET /api/admin/prices
pub async fn get_prices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PriceEntry>>, Response> {
    check_auth(&state, &headers)?;

    let prices = {
        let db = state.db.lock().unwrap();
        queries::list_prices(&db).map_err(internal_error)?
    };
    Ok(Json(prices))
}

// POST /api/admin/prices
#[derive(Deserialize)]
pub struct PriceUpdateRequest {
    pub catalog_id: String,
    pub price_minor: Option<i64>,
    pub active: Option<bool>,
}

pub async fn update_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PriceUpdateRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&state, &headers)?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_price(
            &db,
            &request.catalog_id,
            request.price_minor,
            request.active,
        )
        .map_err(internal_error)?
    };

    if !updated {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("no catalog entry: {}", request.catalog_id)})),
        )
            .into_response());
    }

    // Quotes must see the new price immediately, not after TTL expiry.
    state.price_cache.invalidate_all();
    tracing::info!(catalog_id = %request.catalog_id, "price updated, cache invalidated");

    Ok(Json(serde_json::json!({ "updated": true })))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingRecord>>, Response> {
    check_auth(&state, &headers)?;

    let limit = query.limit.unwrap_or(50);
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(&db, query.status.as_deref(), limit).map_err(internal_error)?
    };
    Ok(Json(bookings))
}

// POST /api/admin/recover
#[derive(Deserialize)]
pub struct RecoverRequest {
    pub reference_id: String,
}

pub async fn recover(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RecoverRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&state, &headers)?;

    if !reference::is_valid(&request.reference_id) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "malformed reference id"})),
        )
            .into_response());
    }

    let recovered = recovery::recover_by_reference(&state, &request.reference_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(serde_json::json!({ "recovered": recovered })))
}

// POST /api/admin/sweep
pub async fn sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&state, &headers)?;

    let delivered = recovery::sweep(&state, SWEEP_BATCH).await;
    Ok(Json(serde_json::json!({ "delivered": delivered })))
}

fn internal_error(e: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}
