use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::queries;
use crate::models::{BookingRecord, BookingStatus, GatewayPayment};
use crate::services::email::{ConfirmationEmail, EmailDispatcher, BOOKING_CONFIRMATION};
use crate::state::AppState;

/// Automatic sweeps stay small; a backlog gets drained across page loads
/// rather than in one burst.
pub const SWEEP_BATCH: i64 = 10;

/// Bounded fixed-backoff retry for confirmation emails. Exhaustion parks the
/// booking in `payment_received_needs_email` for a later sweep or a manual
/// trigger; never an unbounded loop, never a silent drop.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

/// Minimal booking synthesized when a verified payment has no booking and no
/// snapshot to reconstruct one from. Carries only what the gateway knew, so
/// the money is never financially orphaned even though booking specifics are
/// incomplete.
pub fn synthesize(reference_id: &str, payment: &GatewayPayment, currency: &str) -> BookingRecord {
    let now = Utc::now().naive_utc();
    BookingRecord {
        reference_id: reference_id.to_string(),
        client_name: String::new(),
        email: payment.email.clone().unwrap_or_default(),
        phone: payment.contact.clone().unwrap_or_default(),
        message: None,
        category: String::new(),
        services: vec![],
        schedule_date: None,
        schedule_slot: None,
        timeframe: None,
        status: BookingStatus::PaymentReceivedNeedsDetails,
        payment_id: Some(payment.id.clone()),
        order_id: payment.order_id.clone(),
        amount_minor: Some(payment.amount_minor),
        currency: currency.to_string(),
        email_sent: false,
        source: "recovery".to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn build_email(
    booking: &BookingRecord,
    high_priority: bool,
    is_resend: bool,
) -> ConfirmationEmail {
    let service_type = if booking.services.is_empty() {
        booking.category.clone()
    } else {
        booking.services.join(", ")
    };
    let date = booking
        .schedule_date
        .clone()
        .or_else(|| booking.timeframe.clone())
        .unwrap_or_default();

    ConfirmationEmail {
        kind: BOOKING_CONFIRMATION.to_string(),
        client_name: booking.client_name.clone(),
        email: booking.email.clone(),
        reference_id: booking.reference_id.clone(),
        service_type,
        date,
        time: booking.schedule_slot.clone().unwrap_or_default(),
        price: booking.amount_minor.unwrap_or(0),
        high_priority,
        is_resend,
    }
}

async fn send_with_retry(
    email: &dyn EmailDispatcher,
    message: &ConfirmationEmail,
    policy: &RetryPolicy,
) -> bool {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match email.send(message).await {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    reference_id = %message.reference_id,
                    "confirmation email attempt failed"
                );
                if attempt >= policy.max_attempts {
                    return false;
                }
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// Send (or re-send) the confirmation email for one booking and record the
/// outcome. Returns whether an email is now on file for the booking.
pub async fn deliver_confirmation(
    state: &Arc<AppState>,
    reference_id: &str,
    high_priority: bool,
    is_resend: bool,
) -> anyhow::Result<bool> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking(&db, reference_id)?
    };
    let Some(booking) = booking else {
        tracing::warn!(reference_id = %reference_id, "no booking to deliver email for");
        return Ok(false);
    };

    if booking.email_sent && !is_resend {
        return Ok(true);
    }
    if booking.email.is_empty() {
        // Nothing to send to. A needs_details record stays parked for an
        // operator to fill in.
        return Ok(false);
    }

    let message = build_email(&booking, high_priority, is_resend);
    let sent = send_with_retry(state.email.as_ref(), &message, &state.retry_policy).await;

    {
        let db = state.db.lock().unwrap();
        queries::set_email_outcome(&db, reference_id, sent)?;
    }

    if sent {
        tracing::info!(reference_id = %reference_id, is_resend, "confirmation email delivered");
    } else {
        tracing::error!(
            reference_id = %reference_id,
            "confirmation email exhausted retries, parked for recovery"
        );
    }

    Ok(sent)
}

/// Scan for paid bookings still missing their confirmation email and re-drive
/// the send. Runs on designated page loads and from the admin endpoint.
pub async fn sweep(state: &Arc<AppState>, cap: i64) -> usize {
    let pending = {
        let db = state.db.lock().unwrap();
        match queries::get_email_pending(&db, cap) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "reconciliation sweep query failed");
                return 0;
            }
        }
    };

    if pending.is_empty() {
        return 0;
    }
    tracing::info!(count = pending.len(), "reconciliation sweep starting");

    let mut delivered = 0;
    for booking in pending {
        match deliver_confirmation(state, &booking.reference_id, false, false).await {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    reference_id = %booking.reference_id,
                    "sweep delivery failed"
                );
            }
        }
    }
    delivered
}

/// Operator-triggered recovery for one reference id: re-fetch the booking,
/// rebuild the payload, and resend with the high-priority flag so downstream
/// email infra bypasses normal batching.
pub async fn recover_by_reference(
    state: &Arc<AppState>,
    reference_id: &str,
) -> anyhow::Result<bool> {
    deliver_confirmation(state, reference_id, true, true).await
}
