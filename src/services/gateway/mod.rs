pub mod razorpay;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AppError;
use crate::models::{GatewayOrder, GatewayPayment};

/// Hosted-checkout payment gateway. The service only ever supplies
/// server-resolved amounts and receives authoritative payment state back;
/// nothing price-shaped is trusted from the client.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        reference_id: &str,
        amount_minor: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, AppError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, AppError>;
}

/// Checkout success callbacks may carry an HMAC-SHA256 signature over
/// `order_id|payment_id`. Absence is tolerated (the server-side payment
/// lookup is the authoritative check), but a present signature must match.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == signature
}
