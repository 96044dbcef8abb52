use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use p2h_booking::config::AppConfig;
use p2h_booking::db;
use p2h_booking::errors::AppError;
use p2h_booking::handlers;
use p2h_booking::models::{GatewayOrder, GatewayPayment};
use p2h_booking::services::email::{ConfirmationEmail, EmailDispatcher};
use p2h_booking::services::gateway::PaymentGateway;
use p2h_booking::services::pricing::PriceCache;
use p2h_booking::services::recovery::{self, RetryPolicy};
use p2h_booking::services::verification::{self, VerifyRequest};
use p2h_booking::state::AppState;

// ── Mock Providers ──

struct MockGateway {
    payment_status: Mutex<String>,
    payment_amount: Mutex<i64>,
    fail_fetch: AtomicBool,
    orders_created: AtomicU64,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            payment_status: Mutex::new("captured".to_string()),
            payment_amount: Mutex::new(2500),
            fail_fetch: AtomicBool::new(false),
            orders_created: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(
        &self,
        _reference_id: &str,
        _amount_minor: i64,
        _currency: &str,
        _description: &str,
    ) -> Result<GatewayOrder, AppError> {
        let n = self.orders_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            order_id: format!("order_{n}"),
            gateway_key: "rzp_test_key".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, AppError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(AppError::PaymentVerificationFailed(
                "gateway unreachable".to_string(),
            ));
        }
        Ok(GatewayPayment {
            id: payment_id.to_string(),
            order_id: Some("order_1".to_string()),
            status: self.payment_status.lock().unwrap().clone(),
            amount_minor: *self.payment_amount.lock().unwrap(),
            email: Some("payer@example.com".to_string()),
            contact: Some("+919800000000".to_string()),
        })
    }
}

struct MockEmail {
    sent: Arc<Mutex<Vec<ConfirmationEmail>>>,
    failures_remaining: Arc<AtomicU32>,
}

#[async_trait]
impl EmailDispatcher for MockEmail {
    async fn send(&self, message: &ConfirmationEmail) -> anyhow::Result<()> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("simulated dispatch failure");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ── Helpers ──

struct TestHarness {
    state: Arc<AppState>,
    sent_emails: Arc<Mutex<Vec<ConfirmationEmail>>>,
    email_failures: Arc<AtomicU32>,
    gateway: Arc<MockGateway>,
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        gateway_api_url: "http://localhost:0".to_string(),
        gateway_key_id: "rzp_test_key".to_string(),
        gateway_key_secret: "rzp_test_secret".to_string(),
        email_api_url: "http://localhost:0".to_string(),
        email_api_key: "email-key".to_string(),
        currency: "INR".to_string(),
        settle_delay_secs: 0,
        thank_you_url: "/thank-you".to_string(),
    }
}

struct SharedMockGateway(Arc<MockGateway>);

#[async_trait]
impl PaymentGateway for SharedMockGateway {
    async fn create_order(
        &self,
        reference_id: &str,
        amount_minor: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, AppError> {
        self.0
            .create_order(reference_id, amount_minor, currency, description)
            .await
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, AppError> {
        self.0.fetch_payment(payment_id).await
    }
}

fn harness() -> TestHarness {
    let conn = db::init_db(":memory:").unwrap();
    let sent_emails = Arc::new(Mutex::new(vec![]));
    let email_failures = Arc::new(AtomicU32::new(0));
    let gateway = Arc::new(MockGateway::new());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        gateway: Box::new(SharedMockGateway(Arc::clone(&gateway))),
        email: Box::new(MockEmail {
            sent: Arc::clone(&sent_emails),
            failures_remaining: Arc::clone(&email_failures),
        }),
        price_cache: PriceCache::default(),
        checkouts: Mutex::new(HashMap::new()),
        retry_policy: RetryPolicy::immediate(),
    });

    TestHarness {
        state,
        sent_emails,
        email_failures,
        gateway,
    }
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/prices/quote", post(handlers::prices::quote))
        .route("/api/checkout/start", post(handlers::checkout::start))
        .route("/api/checkout/callback", post(handlers::checkout::callback))
        .route("/api/payments/confirm", post(handlers::payments::confirm))
        .route(
            "/api/bookings/:reference_id",
            get(handlers::bookings::get_booking),
        )
        .route("/api/admin/login", post(handlers::admin::login))
        .route(
            "/api/admin/prices",
            get(handlers::admin::get_prices).post(handlers::admin::update_price),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route("/api/admin/recover", post(handlers::admin::recover))
        .route("/api/admin/sweep", post(handlers::admin::sweep))
        .with_state(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", "Bearer test-token");
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_default())
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn draft_json() -> serde_json::Value {
    serde_json::json!({
        "category": "counselling",
        "services": ["individual-counselling"],
        "schedule": { "kind": "slot", "date": "2026-09-01", "time": "10:00 AM" },
        "contact": {
            "name": "Asha Rao",
            "email": "asha@example.com",
            "phone": "+919800000001",
            "message": "first session"
        }
    })
}

fn verify_request(reference_id: &str, payment_id: &str) -> VerifyRequest {
    VerifyRequest {
        reference_id: reference_id.to_string(),
        payment_id: payment_id.to_string(),
        order_id: Some("order_1".to_string()),
        signature: None,
        booking_details: None,
    }
}

fn booking_row_count(state: &Arc<AppState>, reference_id: &str) -> i64 {
    let db = state.db.lock().unwrap();
    db.query_row(
        "SELECT COUNT(*) FROM bookings WHERE reference_id = ?1",
        [reference_id],
        |row| row.get(0),
    )
    .unwrap()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

// ── Price Quote API ──

#[tokio::test]
async fn test_quote_known_service() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/prices/quote",
            serde_json::json!({ "services": ["individual-counselling"] }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["complete"], true);
    assert_eq!(json["prices"]["individual-counselling"], 150000);
    assert_eq!(json["total"], 150000);
}

#[tokio::test]
async fn test_quote_unknown_service_is_unavailable_not_zero() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/prices/quote",
            serde_json::json!({ "services": ["no-such-service"] }),
        ))
        .await
        .unwrap();

    let json = body_json(res).await;
    assert_eq!(json["complete"], false);
    assert!(json["prices"].as_object().unwrap().is_empty());
    assert_eq!(json["unavailable"][0], "no-such-service");
}

// ── Checkout Start ──

#[tokio::test]
async fn test_checkout_start_returns_server_resolved_order() {
    let h = harness();
    let app = test_app(h.state.clone());

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "draft": draft_json() }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["order_id"], "order_1");
    assert_eq!(json["gateway_key"], "rzp_test_key");
    assert_eq!(json["amount_minor"], 150000);
    assert_eq!(json["currency"], "INR");
    assert_eq!(json["prefill"]["name"], "Asha Rao");

    let reference_id = json["reference_id"].as_str().unwrap();
    assert!(reference_id.starts_with("P2H-"));

    // The draft was snapshotted durably before the widget ever opens.
    let db = h.state.db.lock().unwrap();
    let snapshot: String = db
        .query_row(
            "SELECT draft FROM checkout_snapshots WHERE reference_id = ?1",
            [reference_id],
            |row| row.get(0),
        )
        .unwrap();
    assert!(snapshot.contains("asha@example.com"));
}

#[tokio::test]
async fn test_checkout_start_rejects_unpriceable_service() {
    let h = harness();
    let app = test_app(h.state);

    let mut draft = draft_json();
    draft["services"] = serde_json::json!(["no-such-service"]);
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "draft": draft }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_checkout_start_rejects_invalid_draft() {
    let h = harness();
    let app = test_app(h.state);

    let mut draft = draft_json();
    draft["contact"]["email"] = serde_json::json!("not-an-email");
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "draft": draft }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_start_rejects_malformed_reference_id() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "reference_id": "BOGUS-1", "draft": draft_json() }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Checkout Callback ──

#[tokio::test]
async fn test_callback_rejects_success_without_open_widget() {
    let h = harness();
    let app = test_app(h.state);

    // No checkout was started for this reference id at all.
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/callback",
            serde_json::json!({
                "reference_id": "P2H-111111-1111",
                "event": "success",
                "payment_id": "pay_1",
                "order_id": "order_1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_dismiss_rearms_session() {
    let h = harness();

    // Start checkout, then walk the widget open and dismiss it.
    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "draft": draft_json() }),
        ))
        .await
        .unwrap();
    let reference_id = body_json(res).await["reference_id"]
        .as_str()
        .unwrap()
        .to_string();

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/callback",
            serde_json::json!({ "reference_id": reference_id, "event": "open" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/callback",
            serde_json::json!({ "reference_id": reference_id, "event": "dismissed" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["phase"], "ready");
    assert!(json["notice"].as_str().unwrap().contains("try again"));
}

#[tokio::test]
async fn test_callback_failure_records_audit_booking() {
    let h = harness();

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "reference_id": "P2H-222222-2222", "draft": draft_json() }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for event in [
        serde_json::json!({ "reference_id": "P2H-222222-2222", "event": "open" }),
        serde_json::json!({
            "reference_id": "P2H-222222-2222",
            "event": "failure",
            "payment_id": "pay_failed_1",
            "code": "BAD_REQUEST_ERROR",
            "description": "Payment failed"
        }),
    ] {
        let app = test_app(h.state.clone());
        let res = app
            .oneshot(json_request("POST", "/api/checkout/callback", event))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let db = h.state.db.lock().unwrap();
    let status: String = db
        .query_row(
            "SELECT status FROM bookings WHERE reference_id = 'P2H-222222-2222'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "payment_failed");
}

// ── Verification Pipeline ──

#[tokio::test]
async fn test_commit_creates_confirmed_booking_from_details() {
    let h = harness();
    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());

    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    assert_eq!(booking_row_count(&h.state, "P2H-123456-0007"), 1);
    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-123456-0007")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "confirmed");
    assert_eq!(booking.amount_minor, Some(2500));
    assert_eq!(booking.client_name, "Asha Rao");
    assert!(booking.email_sent, "email should be delivered by commit");

    let emails = h.sent_emails.lock().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].reference_id, "P2H-123456-0007");
    assert!(!emails[0].is_resend);
}

#[tokio::test]
async fn test_commit_is_idempotent() {
    let h = harness();
    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());

    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    assert_eq!(booking_row_count(&h.state, "P2H-123456-0007"), 1);
    let (payment_count, payment_row) = {
        let db = h.state.db.lock().unwrap();
        (
            p2h_booking::db::queries::count_payments_for_reference(&db, "P2H-123456-0007").unwrap(),
            p2h_booking::db::queries::get_payment(&db, "pay_100").unwrap().unwrap(),
        )
    };
    assert_eq!(payment_count, 1);
    assert_eq!(payment_row.reference_id, "P2H-123456-0007");
    assert_eq!(payment_row.amount_minor, 2500);

    // The second commit must not re-send the email.
    assert_eq!(h.sent_emails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_uses_snapshot_when_details_missing() {
    let h = harness();

    // Checkout start persists the snapshot.
    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/start",
            serde_json::json!({ "reference_id": "P2H-333333-3333", "draft": draft_json() }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Commit arrives with no booking details (e.g. tab closed mid-flow).
    let req = verify_request("P2H-333333-3333", "pay_200");
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-333333-3333")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "confirmed");
    assert_eq!(booking.client_name, "Asha Rao");
    assert_eq!(booking.email, "asha@example.com");
}

#[tokio::test]
async fn test_commit_synthesizes_recovery_record_when_nothing_known() {
    let h = harness();

    // No booking, no snapshot, but a captured payment of 2500.
    let req = verify_request("P2H-444444-4444", "pay_300");
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-444444-4444")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "payment_received_needs_details");
    assert_eq!(booking.payment_id.as_deref(), Some("pay_300"));
    assert_eq!(booking.amount_minor, Some(2500));
    assert_eq!(booking.source, "recovery");
    // The gateway knew the payer's email, so confirmation still went out.
    assert_eq!(booking.email, "payer@example.com");
}

#[tokio::test]
async fn test_repeat_commit_cannot_promote_needs_details() {
    let h = harness();

    let req = verify_request("P2H-555555-5555", "pay_400");
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-555555-5555")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "payment_received_needs_details");
}

#[tokio::test]
async fn test_unsettled_payment_records_failed_attempt_and_no_email() {
    let h = harness();
    *h.gateway.payment_status.lock().unwrap() = "failed".to_string();

    let mut req = verify_request("P2H-666666-6666", "pay_500");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());

    let err = verification::confirm(&h.state, &req).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentVerificationFailed(_)));

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-666666-6666")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "payment_failed");
    assert!(h.sent_emails.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_attempt_cannot_downgrade_confirmed_booking() {
    let h = harness();

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    // A stray retry with a payment the gateway no longer honors.
    *h.gateway.payment_status.lock().unwrap() = "failed".to_string();
    let retry = verify_request("P2H-123456-0007", "pay_bogus");
    assert!(verification::confirm(&h.state, &retry).await.is_err());

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-123456-0007")
            .unwrap()
            .unwrap()
    };
    assert_eq!(booking.status.as_str(), "confirmed");
    assert_eq!(booking.payment_id.as_deref(), Some("pay_100"));
}

#[tokio::test]
async fn test_confirm_endpoint_fast_path() {
    let h = harness();
    let app = test_app(h.state.clone());

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/payments/confirm",
            serde_json::json!({
                "reference_id": "P2H-777777-7777",
                "payment_id": "pay_600",
                "order_id": "order_1",
                "booking_details": draft_json(),
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["verified"], true);
    assert_eq!(json["redirect_url"], "/thank-you");

    // Commit runs in the background; poll briefly for the record.
    for _ in 0..50 {
        if booking_row_count(&h.state, "P2H-777777-7777") == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("background commit never persisted the booking");
}

#[tokio::test]
async fn test_confirm_endpoint_gateway_transport_failure() {
    let h = harness();
    h.gateway.fail_fetch.store(true, Ordering::SeqCst);
    let app = test_app(h.state.clone());

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/payments/confirm",
            serde_json::json!({
                "reference_id": "P2H-888888-8888",
                "payment_id": "pay_700",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    // The failed attempt is still recorded for audit.
    assert_eq!(booking_row_count(&h.state, "P2H-888888-8888"), 1);
}

// ── Recovery & Reconciliation ──

#[tokio::test]
async fn test_email_failure_parks_booking_for_recovery() {
    let h = harness();
    h.email_failures.store(u32::MAX, Ordering::SeqCst);

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-123456-0007")
            .unwrap()
            .unwrap()
    };
    assert!(!booking.email_sent);
    assert_eq!(booking.status.as_str(), "payment_received_needs_email");
}

#[tokio::test]
async fn test_email_retries_are_bounded() {
    let h = harness();
    h.email_failures.store(u32::MAX, Ordering::SeqCst);

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    // Exactly max_attempts sends were tried, not an unbounded loop.
    let consumed = u32::MAX - h.email_failures.load(Ordering::SeqCst);
    assert_eq!(consumed, h.state.retry_policy.max_attempts);
}

#[tokio::test]
async fn test_sweep_delivers_parked_email() {
    let h = harness();
    h.email_failures.store(u32::MAX, Ordering::SeqCst);

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    // Email infra recovers; the next sweep closes the gap.
    h.email_failures.store(0, Ordering::SeqCst);
    let delivered = recovery::sweep(&h.state, recovery::SWEEP_BATCH).await;
    assert_eq!(delivered, 1);

    let booking = {
        let db = h.state.db.lock().unwrap();
        p2h_booking::db::queries::get_booking(&db, "P2H-123456-0007")
            .unwrap()
            .unwrap()
    };
    assert!(booking.email_sent);
    assert_eq!(booking.status.as_str(), "confirmed");
}

#[tokio::test]
async fn test_sweep_ignores_settled_bookings() {
    let h = harness();

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();
    assert_eq!(h.sent_emails.lock().unwrap().len(), 1);

    let delivered = recovery::sweep(&h.state, recovery::SWEEP_BATCH).await;
    assert_eq!(delivered, 0);
    assert_eq!(h.sent_emails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_manual_recovery_resends_with_priority_flags() {
    let h = harness();

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/recover",
            Some(serde_json::json!({ "reference_id": "P2H-123456-0007" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["recovered"], true);

    let emails = h.sent_emails.lock().unwrap();
    assert_eq!(emails.len(), 2);
    assert!(emails[1].high_priority);
    assert!(emails[1].is_resend);
}

#[tokio::test]
async fn test_manual_recovery_unknown_reference_returns_false() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/recover",
            Some(serde_json::json!({ "reference_id": "P2H-999999-9999" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["recovered"], false);
}

// ── Booking Status Lookup ──

#[tokio::test]
async fn test_booking_lookup() {
    let h = harness();

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/bookings/P2H-123456-0007")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["amount_minor"], 2500);
}

#[tokio::test]
async fn test_booking_lookup_not_found() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/bookings/P2H-000000-0000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Admin API ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_login_issues_session() {
    let h = harness();

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            serde_json::json!({ "token": "test-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    let session = json["session_token"].as_str().unwrap().to_string();
    assert_eq!(json["expires_in_hours"], 24);

    // The session token works for admin endpoints.
    let app = test_app(h.state);
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .header("Authorization", format!("Bearer {session}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_login_rejects_wrong_token() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            serde_json::json!({ "token": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_price_update_invalidates_cache() {
    let h = harness();

    // Warm the cache.
    let app = test_app(h.state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/prices/quote",
            serde_json::json!({ "services": ["individual-counselling"] }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["prices"]["individual-counselling"], 150000);

    let app = test_app(h.state.clone());
    let res = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/prices",
            Some(serde_json::json!({ "catalog_id": "SVC-COUNSEL-IND", "price_minor": 180000 })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The fresh price is visible immediately, not after TTL expiry.
    let app = test_app(h.state);
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/prices/quote",
            serde_json::json!({ "services": ["individual-counselling"] }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["prices"]["individual-counselling"], 180000);
}

#[tokio::test]
async fn test_admin_price_update_unknown_id() {
    let h = harness();
    let app = test_app(h.state);

    let res = app
        .oneshot(admin_request(
            "POST",
            "/api/admin/prices",
            Some(serde_json::json!({ "catalog_id": "SVC-NOPE", "price_minor": 100 })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_sweep_endpoint() {
    let h = harness();
    h.email_failures.store(u32::MAX, Ordering::SeqCst);

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    h.email_failures.store(0, Ordering::SeqCst);
    let app = test_app(h.state.clone());
    let res = app
        .oneshot(admin_request("POST", "/api/admin/sweep", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["delivered"], 1);
}

#[tokio::test]
async fn test_admin_bookings_listing_with_status_filter() {
    let h = harness();

    let mut req = verify_request("P2H-123456-0007", "pay_100");
    req.booking_details = Some(serde_json::from_value(draft_json()).unwrap());
    let payment = verification::confirm(&h.state, &req).await.unwrap();
    verification::commit(&h.state, &req, &payment).await.unwrap();

    let app = test_app(h.state);
    let res = app
        .oneshot(admin_request(
            "GET",
            "/api/admin/bookings?status=confirmed",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["reference_id"], "P2H-123456-0007");
}
