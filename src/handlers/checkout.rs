use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::BookingDraft;
use crate::services::checkout::{self, CheckoutEvent, CheckoutInit};
use crate::services::verification::{self, VerifyRequest};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartRequest {
    pub reference_id: Option<String>,
    pub draft: BookingDraft,
}

// POST /api/checkout/start
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<CheckoutInit>, AppError> {
    let init = checkout::start(&state, request.draft, request.reference_id).await?;
    Ok(Json(init))
}

/// Widget callback relay. `success` hands off to the verification pipeline;
/// `failure` leaves an audit record; `dismissed` re-arms the session and
/// surfaces a non-blocking notice.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CallbackEvent {
    ScriptLoad,
    Ready,
    Open,
    Success {
        payment_id: String,
        order_id: String,
        signature: Option<String>,
    },
    Failure {
        payment_id: Option<String>,
        order_id: Option<String>,
        code: Option<String>,
        description: Option<String>,
    },
    Dismissed,
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub reference_id: String,
    #[serde(flatten)]
    pub event: CallbackEvent,
}

// POST /api/checkout/callback
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reference_id = request.reference_id.clone();

    let machine_event = match &request.event {
        CallbackEvent::ScriptLoad => CheckoutEvent::ScriptLoad,
        CallbackEvent::Ready => CheckoutEvent::Ready,
        CallbackEvent::Open => CheckoutEvent::Open,
        CallbackEvent::Success { .. } => CheckoutEvent::Success,
        CallbackEvent::Failure { .. } => CheckoutEvent::Failure,
        CallbackEvent::Dismissed => CheckoutEvent::Dismiss,
    };
    let phase = checkout::apply_event(&state, &reference_id, machine_event)?;

    match request.event {
        CallbackEvent::Success {
            payment_id,
            order_id,
            signature,
        } => {
            // Kick verification in the background; the authoritative
            // user-facing outcome comes from /api/payments/confirm, and the
            // pipeline is idempotent if both paths run.
            let verify = VerifyRequest {
                reference_id: reference_id.clone(),
                payment_id,
                order_id: Some(order_id),
                signature,
                booking_details: None,
            };
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                match verification::confirm(&state, &verify).await {
                    Ok(payment) => {
                        if let Err(e) = verification::commit(&state, &verify, &payment).await {
                            tracing::error!(
                                reference_id = %verify.reference_id,
                                error = %e,
                                "background commit after callback failed"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            reference_id = %verify.reference_id,
                            error = %e,
                            "callback-driven verification failed"
                        );
                    }
                }
            });
            Ok(Json(serde_json::json!({ "phase": phase.as_str() })))
        }
        CallbackEvent::Failure {
            payment_id,
            order_id,
            code,
            description,
        } => {
            tracing::warn!(
                reference_id = %reference_id,
                code = code.as_deref().unwrap_or("unknown"),
                description = description.as_deref().unwrap_or(""),
                "checkout widget reported failure"
            );
            verification::record_widget_failure(&state, &reference_id, payment_id, order_id);
            Ok(Json(serde_json::json!({
                "phase": phase.as_str(),
                "reference_id": reference_id,
            })))
        }
        CallbackEvent::Dismissed => Ok(Json(serde_json::json!({
            "phase": phase.as_str(),
            "notice": "Payment was not completed. You can try again when ready.",
        }))),
        _ => Ok(Json(serde_json::json!({ "phase": phase.as_str() }))),
    }
}
