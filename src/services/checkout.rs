use std::sync::Arc;

use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{reference, BookingDraft, ContactDetails};
use crate::services::pricing;
use crate::state::AppState;

/// Snapshots outlive a closed tab long enough for recovery to pick them up,
/// but not much longer.
const SNAPSHOT_TTL_MINUTES: i64 = 60;

/// Last-resort clamp so a broken price computation can never produce a
/// zero-amount gateway order.
const MIN_ORDER_AMOUNT_MINOR: i64 = 100;

/// Client-side checkout lifecycle, mirrored server-side so double-opens and
/// out-of-order callbacks are rejected instead of silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Idle,
    ScriptLoading,
    Ready,
    WidgetOpen,
    Succeeded,
    Failed,
}

impl CheckoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutPhase::Idle => "idle",
            CheckoutPhase::ScriptLoading => "script_loading",
            CheckoutPhase::Ready => "ready",
            CheckoutPhase::WidgetOpen => "widget_open",
            CheckoutPhase::Succeeded => "succeeded",
            CheckoutPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    ScriptLoad,
    Ready,
    Open,
    Success,
    Failure,
    Dismiss,
}

impl CheckoutEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutEvent::ScriptLoad => "script_load",
            CheckoutEvent::Ready => "ready",
            CheckoutEvent::Open => "open",
            CheckoutEvent::Success => "success",
            CheckoutEvent::Failure => "failure",
            CheckoutEvent::Dismiss => "dismiss",
        }
    }
}

#[derive(Debug)]
pub struct InvalidTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "checkout event {} not valid in phase {}", self.event, self.from)
    }
}

/// Apply one widget event. `ScriptLoad` is re-entrant because the gateway
/// script may already be present from a prior mount. `Dismiss` re-arms the
/// session at `Ready` so the user can retry without restarting checkout.
pub fn transition(
    phase: CheckoutPhase,
    event: CheckoutEvent,
) -> Result<CheckoutPhase, InvalidTransition> {
    use CheckoutEvent as E;
    use CheckoutPhase as P;

    let next = match (phase, event) {
        (P::Idle | P::Ready | P::ScriptLoading, E::ScriptLoad) => P::ScriptLoading,
        (P::ScriptLoading | P::Ready, E::Ready) => P::Ready,
        (P::Ready, E::Open) => P::WidgetOpen,
        (P::WidgetOpen, E::Success) => P::Succeeded,
        (P::WidgetOpen, E::Failure) => P::Failed,
        (P::WidgetOpen, E::Dismiss) => P::Ready,
        (from, event) => {
            return Err(InvalidTransition {
                from: from.as_str(),
                event: event.as_str(),
            })
        }
    };
    Ok(next)
}

#[derive(Debug, Serialize)]
pub struct CheckoutInit {
    pub reference_id: String,
    pub order_id: String,
    pub gateway_key: String,
    pub amount_minor: i64,
    pub currency: String,
    pub prefill: ContactDetails,
}

/// Resolve an authoritative price for the draft, snapshot it durably, and
/// mint a gateway order. The client only ever contributed identifiers; the
/// amount is entirely server-resolved.
pub async fn start(
    state: &Arc<AppState>,
    draft: BookingDraft,
    reference_id: Option<String>,
) -> Result<CheckoutInit, AppError> {
    draft.validate().map_err(AppError::Validation)?;

    let reference_id = match reference_id {
        Some(id) if reference::is_valid(&id) => id,
        Some(id) => {
            return Err(AppError::Validation(format!("malformed reference id: {id}")));
        }
        None => reference::generate(),
    };

    let quote = {
        let db = state.db.lock().unwrap();
        let _ = queries::purge_expired_snapshots(&db);
        pricing::quote(&db, &state.price_cache, &draft.services)
    };

    if !quote.complete || quote.prices.is_empty() {
        return Err(AppError::PriceUnavailable(quote.unavailable.join(", ")));
    }

    let mut amount_minor = quote.total;
    if amount_minor <= 0 {
        tracing::warn!(
            reference_id = %reference_id,
            computed = amount_minor,
            "non-positive computed price, clamping to minimum order amount"
        );
        amount_minor = MIN_ORDER_AMOUNT_MINOR;
    }

    // Durability point: from here on, recovery can reconstruct the booking
    // even if the client never comes back.
    {
        let db = state.db.lock().unwrap();
        let draft_json = serde_json::to_string(&draft)
            .map_err(|e| AppError::RecordPersistenceFailed(e.to_string()))?;
        queries::save_snapshot(&db, &reference_id, &draft_json, SNAPSHOT_TTL_MINUTES)
            .map_err(|e| AppError::RecordPersistenceFailed(e.to_string()))?;
    }

    let description = format!("{}: {}", draft.category, draft.services.join(", "));
    let order = state
        .gateway
        .create_order(
            &reference_id,
            amount_minor,
            &state.config.currency,
            &description,
        )
        .await?;

    state
        .checkouts
        .lock()
        .unwrap()
        .insert(reference_id.clone(), CheckoutPhase::Ready);

    tracing::info!(
        reference_id = %reference_id,
        order_id = %order.order_id,
        amount_minor,
        "checkout initialized"
    );

    Ok(CheckoutInit {
        reference_id,
        order_id: order.order_id,
        gateway_key: order.gateway_key,
        amount_minor,
        currency: state.config.currency.clone(),
        prefill: draft.contact,
    })
}

/// Drive the per-reference state machine from a widget callback. Unknown
/// reference ids start at `Idle`, which rejects everything except a script
/// load, so callbacks for sessions this server never initialized go nowhere.
pub fn apply_event(
    state: &Arc<AppState>,
    reference_id: &str,
    event: CheckoutEvent,
) -> Result<CheckoutPhase, AppError> {
    let mut checkouts = state.checkouts.lock().unwrap();
    let current = checkouts
        .get(reference_id)
        .copied()
        .unwrap_or(CheckoutPhase::Idle);

    let next = transition(current, event)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    checkouts.insert(reference_id.to_string(), next);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut phase = CheckoutPhase::Idle;
        for event in [
            CheckoutEvent::ScriptLoad,
            CheckoutEvent::Ready,
            CheckoutEvent::Open,
            CheckoutEvent::Success,
        ] {
            phase = transition(phase, event).unwrap();
        }
        assert_eq!(phase, CheckoutPhase::Succeeded);
    }

    #[test]
    fn test_script_load_is_reentrant() {
        let phase = transition(CheckoutPhase::ScriptLoading, CheckoutEvent::ScriptLoad).unwrap();
        assert_eq!(phase, CheckoutPhase::ScriptLoading);
        // A remount after Ready may re-check the script too.
        let phase = transition(CheckoutPhase::Ready, CheckoutEvent::ScriptLoad).unwrap();
        assert_eq!(phase, CheckoutPhase::ScriptLoading);
    }

    #[test]
    fn test_widget_cannot_open_twice() {
        let phase = transition(CheckoutPhase::Ready, CheckoutEvent::Open).unwrap();
        assert_eq!(phase, CheckoutPhase::WidgetOpen);
        assert!(transition(CheckoutPhase::WidgetOpen, CheckoutEvent::Open).is_err());
    }

    #[test]
    fn test_dismiss_returns_to_ready() {
        let phase = transition(CheckoutPhase::WidgetOpen, CheckoutEvent::Dismiss).unwrap();
        assert_eq!(phase, CheckoutPhase::Ready);
        // And the user can open the widget again.
        assert!(transition(phase, CheckoutEvent::Open).is_ok());
    }

    #[test]
    fn test_failure_carries_terminal_phase() {
        let phase = transition(CheckoutPhase::WidgetOpen, CheckoutEvent::Failure).unwrap();
        assert_eq!(phase, CheckoutPhase::Failed);
        assert!(transition(phase, CheckoutEvent::Open).is_err());
    }

    #[test]
    fn test_success_requires_open_widget() {
        assert!(transition(CheckoutPhase::Ready, CheckoutEvent::Success).is_err());
        assert!(transition(CheckoutPhase::Idle, CheckoutEvent::Success).is_err());
    }
}
