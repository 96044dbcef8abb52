use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::models::reference;
use crate::services::recovery::{self, SWEEP_BATCH};
use crate::services::verification::{self, VerifyOutcome, VerifyRequest};
use crate::state::AppState;

// POST /api/payments/confirm
//
// Fast path: answer the client as soon as the gateway confirms the payment.
// Bookkeeping (record upsert, payment insert, confirmation email) continues
// in the background, followed by a reconciliation sweep. A downstream
// failure there never reverts the "payment succeeded" the user already saw.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyOutcome>, AppError> {
    if !reference::is_valid(&request.reference_id) {
        return Err(AppError::Validation(format!(
            "malformed reference id: {}",
            request.reference_id
        )));
    }

    let payment = verification::confirm(&state, &request).await?;

    tracing::info!(
        reference_id = %request.reference_id,
        payment_id = %payment.id,
        amount_minor = payment.amount_minor,
        "payment verified"
    );

    let background_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = verification::commit(&background_state, &request, &payment).await {
            tracing::error!(
                reference_id = %request.reference_id,
                error = %e,
                "commit deferred to recovery layer"
            );
        }
        recovery::sweep(&background_state, SWEEP_BATCH).await;
    });

    Ok(Json(VerifyOutcome {
        success: true,
        verified: true,
        redirect_url: state.config.thank_you_url.clone(),
    }))
}
