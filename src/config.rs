use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub gateway_api_url: String,
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub currency: String,
    pub settle_delay_secs: u64,
    pub thank_you_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "bookings.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            gateway_api_url: env::var("GATEWAY_API_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
            gateway_key_id: env::var("GATEWAY_KEY_ID").unwrap_or_default(),
            gateway_key_secret: env::var("GATEWAY_KEY_SECRET").unwrap_or_default(),
            email_api_url: env::var("EMAIL_API_URL").unwrap_or_default(),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            settle_delay_secs: env::var("SETTLE_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            thank_you_url: env::var("THANK_YOU_URL")
                .unwrap_or_else(|_| "/thank-you".to_string()),
        }
    }
}
