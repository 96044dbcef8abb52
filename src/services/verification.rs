use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    BookingDraft, BookingRecord, BookingStatus, GatewayPayment, PaymentRecord, ScheduleChoice,
};
use crate::services::{gateway, recovery};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub reference_id: String,
    pub payment_id: String,
    pub order_id: Option<String>,
    pub signature: Option<String>,
    #[serde(default)]
    pub booking_details: Option<BookingDraft>,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub verified: bool,
    pub redirect_url: String,
}

/// Phase one: confirm the payment against the gateway's authoritative
/// lookup. A short settle delay avoids racing gateway-side asynchronous
/// settlement. Every failure leaves an audit record with `payment_failed`
/// status; no email is ever sent on a failed verification.
pub async fn confirm(
    state: &Arc<AppState>,
    request: &VerifyRequest,
) -> Result<GatewayPayment, AppError> {
    if let (Some(order_id), Some(signature)) = (&request.order_id, &request.signature) {
        let secret = &state.config.gateway_key_secret;
        if !secret.is_empty()
            && !gateway::verify_signature(secret, order_id, &request.payment_id, signature)
        {
            record_failed_attempt(state, request, None);
            return Err(AppError::PaymentVerificationFailed(
                "callback signature mismatch".to_string(),
            ));
        }
    }

    if state.config.settle_delay_secs > 0 {
        tokio::time::sleep(Duration::from_secs(state.config.settle_delay_secs)).await;
    }

    let payment = match state.gateway.fetch_payment(&request.payment_id).await {
        Ok(p) => p,
        Err(e) => {
            record_failed_attempt(state, request, None);
            return Err(e);
        }
    };

    if !payment.is_settled() {
        tracing::warn!(
            reference_id = %request.reference_id,
            payment_id = %request.payment_id,
            status = %payment.status,
            "payment not settled, recording failed attempt"
        );
        record_failed_attempt(state, request, Some(&payment));
        return Err(AppError::PaymentVerificationFailed(format!(
            "payment status is {}",
            payment.status
        )));
    }

    Ok(payment)
}

/// Phase two: idempotent bookkeeping for a confirmed payment. Safe to re-run
/// with the same reference id and payment id: the booking upsert and the
/// payment upsert converge instead of duplicating, and the email is skipped
/// once it is on file. Runs after the client has already been answered, so
/// failures here defer to the recovery layer instead of surfacing.
pub async fn commit(
    state: &Arc<AppState>,
    request: &VerifyRequest,
    payment: &GatewayPayment,
) -> anyhow::Result<()> {
    let reference_id = &request.reference_id;

    let (existing, snapshot) = {
        let db = state.db.lock().unwrap();
        let existing = queries::get_booking(&db, reference_id)?;
        let snapshot = queries::get_snapshot(&db, reference_id)?;
        (existing, snapshot)
    };

    let draft = request.booking_details.clone().or_else(|| {
        snapshot.and_then(|json| match serde_json::from_str::<BookingDraft>(&json) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(reference_id = %reference_id, error = %e, "unreadable checkout snapshot");
                None
            }
        })
    });

    let record = match (existing, draft) {
        (Some(mut existing), _) => {
            existing.status = match existing.status {
                // Still missing its booking specifics; a repeat commit with
                // no new details cannot promote it.
                BookingStatus::PaymentReceivedNeedsDetails => {
                    BookingStatus::PaymentReceivedNeedsDetails
                }
                _ => BookingStatus::Confirmed,
            };
            existing.payment_id = Some(payment.id.clone());
            existing.order_id = existing.order_id.or_else(|| payment.order_id.clone());
            existing.amount_minor = Some(payment.amount_minor);
            existing.updated_at = Utc::now().naive_utc();
            existing
        }
        (None, Some(draft)) => record_from_draft(reference_id, &draft, payment, &state.config.currency),
        (None, None) => {
            tracing::warn!(
                reference_id = %reference_id,
                payment_id = %payment.id,
                "no booking or snapshot for verified payment, synthesizing recovery record"
            );
            recovery::synthesize(reference_id, payment, &state.config.currency)
        }
    };

    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::upsert_booking(&db, &record) {
            // Fall back to the smallest record that still ties the money to
            // the reference id before giving up.
            tracing::error!(reference_id = %reference_id, error = %e, "booking upsert failed");
            let minimal = recovery::synthesize(reference_id, payment, &state.config.currency);
            queries::upsert_booking(&db, &minimal)?;
        }

        queries::upsert_payment(
            &db,
            &PaymentRecord {
                transaction_id: payment.id.clone(),
                reference_id: reference_id.clone(),
                order_id: payment.order_id.clone(),
                amount_minor: payment.amount_minor,
                status: payment.status.clone(),
                email_sent: false,
                created_at: Utc::now().naive_utc(),
            },
        )?;
    }

    recovery::deliver_confirmation(state, reference_id, false, false).await?;
    Ok(())
}

fn record_from_draft(
    reference_id: &str,
    draft: &BookingDraft,
    payment: &GatewayPayment,
    currency: &str,
) -> BookingRecord {
    let now = Utc::now().naive_utc();
    let (schedule_date, schedule_slot, timeframe) = match &draft.schedule {
        ScheduleChoice::Slot { date, time } => (Some(date.clone()), Some(time.clone()), None),
        ScheduleChoice::Timeframe { bucket } => (None, None, Some(bucket.clone())),
    };

    BookingRecord {
        reference_id: reference_id.to_string(),
        client_name: draft.contact.name.clone(),
        email: draft.contact.email.clone(),
        phone: draft.contact.phone.clone(),
        message: draft.contact.message.clone(),
        category: draft.category.clone(),
        services: draft.services.clone(),
        schedule_date,
        schedule_slot,
        timeframe,
        status: BookingStatus::Confirmed,
        payment_id: Some(payment.id.clone()),
        order_id: payment.order_id.clone(),
        amount_minor: Some(payment.amount_minor),
        currency: currency.to_string(),
        email_sent: false,
        source: "website".to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Record a failure reported by the checkout widget itself (the gateway
/// error payload path), so the attempt is findable by reference id.
pub fn record_widget_failure(
    state: &Arc<AppState>,
    reference_id: &str,
    payment_id: Option<String>,
    order_id: Option<String>,
) {
    let request = VerifyRequest {
        reference_id: reference_id.to_string(),
        payment_id: payment_id.unwrap_or_default(),
        order_id,
        signature: None,
        booking_details: None,
    };
    record_failed_attempt(state, &request, None);
}

/// Audit trail for a verification that did not pass: the attempt is recorded
/// with `payment_failed` status so support can find it by reference id, and
/// is never silently discarded. A booking that already holds a verified
/// payment is left untouched; a stray retry with a bad payment id must not
/// downgrade it.
fn record_failed_attempt(
    state: &Arc<AppState>,
    request: &VerifyRequest,
    payment: Option<&GatewayPayment>,
) {
    {
        let db = state.db.lock().unwrap();
        match queries::get_booking(&db, &request.reference_id) {
            Ok(Some(existing)) if existing.status.payment_complete() => {
                tracing::warn!(
                    reference_id = %request.reference_id,
                    payment_id = %request.payment_id,
                    status = existing.status.as_str(),
                    "ignoring failed attempt against an already-paid booking"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    reference_id = %request.reference_id,
                    error = %e,
                    "could not read booking before recording failed attempt"
                );
            }
        }
    }

    let now = Utc::now().naive_utc();
    let mut record = match &request.booking_details {
        Some(draft) => {
            let placeholder = GatewayPayment {
                id: request.payment_id.clone(),
                order_id: request.order_id.clone(),
                status: "failed".to_string(),
                amount_minor: payment.map(|p| p.amount_minor).unwrap_or(0),
                email: None,
                contact: None,
            };
            record_from_draft(&request.reference_id, draft, &placeholder, &state.config.currency)
        }
        None => BookingRecord {
            reference_id: request.reference_id.clone(),
            client_name: String::new(),
            email: payment.and_then(|p| p.email.clone()).unwrap_or_default(),
            phone: payment.and_then(|p| p.contact.clone()).unwrap_or_default(),
            message: None,
            category: String::new(),
            services: vec![],
            schedule_date: None,
            schedule_slot: None,
            timeframe: None,
            status: BookingStatus::PaymentFailed,
            payment_id: (!request.payment_id.is_empty()).then(|| request.payment_id.clone()),
            order_id: request.order_id.clone(),
            amount_minor: payment.map(|p| p.amount_minor),
            currency: state.config.currency.clone(),
            email_sent: false,
            source: "website".to_string(),
            created_at: now,
            updated_at: now,
        },
    };
    record.status = BookingStatus::PaymentFailed;

    let db = state.db.lock().unwrap();
    if let Err(e) = queries::upsert_booking(&db, &record) {
        tracing::error!(
            reference_id = %request.reference_id,
            error = %e,
            "failed to record failed payment attempt"
        );
    }
}
