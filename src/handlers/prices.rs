use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::models::PriceQuote;
use crate::services::pricing;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub services: Vec<String>,
}

// POST /api/prices/quote
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuoteRequest>,
) -> Json<PriceQuote> {
    let quote = {
        let db = state.db.lock().unwrap();
        pricing::quote(&db, &state.price_cache, &request.services)
    };
    Json(quote)
}
