use anyhow::Context;
use async_trait::async_trait;

use super::{ConfirmationEmail, EmailDispatcher};

/// Transactional email API client. Fire-and-forget from the caller's point
/// of view: the only outcome is success or an error.
pub struct HttpEmailDispatcher {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpEmailDispatcher {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmailDispatcher for HttpEmailDispatcher {
    async fn send(&self, message: &ConfirmationEmail) -> anyhow::Result<()> {
        anyhow::ensure!(!self.api_url.is_empty(), "EMAIL_API_URL not configured");

        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .context("failed to reach email dispatch service")?
            .error_for_status()
            .context("email dispatch service returned error")?;

        Ok(())
    }
}
