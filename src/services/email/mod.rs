pub mod dispatch;

use async_trait::async_trait;
use serde::Serialize;

pub const BOOKING_CONFIRMATION: &str = "booking-confirmation";

/// Payload for the transactional email service. `high_priority` lets
/// recovery resends bypass downstream batching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEmail {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_name: String,
    pub email: String,
    pub reference_id: String,
    pub service_type: String,
    pub date: String,
    pub time: String,
    pub price: i64,
    pub high_priority: bool,
    pub is_resend: bool,
}

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, message: &ConfirmationEmail) -> anyhow::Result<()>;
}
