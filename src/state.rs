use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::checkout::CheckoutPhase;
use crate::services::email::EmailDispatcher;
use crate::services::gateway::PaymentGateway;
use crate::services::pricing::PriceCache;
use crate::services::recovery::RetryPolicy;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub gateway: Box<dyn PaymentGateway>,
    pub email: Box<dyn EmailDispatcher>,
    pub price_cache: PriceCache,
    pub checkouts: Mutex<HashMap<String, CheckoutPhase>>,
    pub retry_policy: RetryPolicy,
}
