use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Durable payment record, inserted after its parent booking exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub transaction_id: String,
    pub reference_id: String,
    pub order_id: Option<String>,
    pub amount_minor: i64,
    pub status: String,
    pub email_sent: bool,
    pub created_at: NaiveDateTime,
}

/// Gateway order minted before opening the checkout widget.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrder {
    pub order_id: String,
    pub gateway_key: String,
}

/// Authoritative payment state as reported by the gateway's lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub amount_minor: i64,
    pub email: Option<String>,
    pub contact: Option<String>,
}

impl GatewayPayment {
    /// Only authorized or captured funds count as a verified payment.
    pub fn is_settled(&self) -> bool {
        matches!(self.status.as_str(), "authorized" | "captured")
    }
}
