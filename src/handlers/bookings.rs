use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::reference;
use crate::services::recovery::{self, SWEEP_BATCH};
use crate::state::AppState;

/// Thank-you-page view: the reference id and progress flags only, not the
/// full booking specifics.
#[derive(Serialize)]
pub struct BookingView {
    pub reference_id: String,
    pub status: String,
    pub email_sent: bool,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub created_at: String,
}

// GET /api/bookings/:reference_id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(reference_id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    if !reference::is_valid(&reference_id) {
        return Err(AppError::Validation(format!(
            "malformed reference id: {reference_id}"
        )));
    }

    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking(&db, &reference_id)
            .map_err(|e| AppError::RecordPersistenceFailed(e.to_string()))?
    }
    .ok_or_else(|| AppError::NotFound(reference_id.clone()))?;

    // A status-page load doubles as a sweep trigger.
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        recovery::sweep(&sweep_state, SWEEP_BATCH).await;
    });

    Ok(Json(BookingView {
        reference_id: booking.reference_id,
        status: booking.status.as_str().to_string(),
        email_sent: booking.email_sent,
        amount_minor: booking.amount_minor,
        currency: booking.currency,
        created_at: booking.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}
