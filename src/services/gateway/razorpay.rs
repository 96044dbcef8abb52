use async_trait::async_trait;
use serde::Deserialize;

use super::PaymentGateway;
use crate::errors::AppError;
use crate::models::{GatewayOrder, GatewayPayment};

pub struct RazorpayGateway {
    api_url: String,
    key_id: String,
    key_secret: String,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(api_url: String, key_id: String, key_secret: String) -> Self {
        Self {
            api_url,
            key_id,
            key_secret,
            client: reqwest::Client::new(),
        }
    }

    fn ensure_configured(&self) -> Result<(), AppError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(AppError::GatewayMisconfigured(
                "gateway key id/secret not set".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct OrderResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: String,
    order_id: Option<String>,
    status: String,
    amount: i64,
    email: Option<String>,
    contact: Option<String>,
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        reference_id: &str,
        amount_minor: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, AppError> {
        self.ensure_configured()?;

        let url = format!("{}/orders", self.api_url);
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": reference_id,
            "notes": { "description": description },
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::OrderCreationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::OrderCreationFailed(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::OrderCreationFailed(e.to_string()))?;

        let order_id = order.id.ok_or_else(|| {
            AppError::OrderCreationFailed("gateway response missing order id".to_string())
        })?;

        Ok(GatewayOrder {
            order_id,
            gateway_key: self.key_id.clone(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, AppError> {
        self.ensure_configured()?;

        let url = format!("{}/payments/{}", self.api_url, payment_id);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::PaymentVerificationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentVerificationFailed(format!(
                "gateway lookup returned {}",
                response.status()
            )));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| AppError::PaymentVerificationFailed(e.to_string()))?;

        Ok(GatewayPayment {
            id: payment.id,
            order_id: payment.order_id,
            status: payment.status,
            amount_minor: payment.amount,
            email: payment.email,
            contact: payment.contact,
        })
    }
}
