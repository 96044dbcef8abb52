use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of the price catalog. Prices are in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub catalog_id: String,
    pub label: String,
    pub price_minor: i64,
    pub currency: String,
    pub active: bool,
    pub category: String,
}

/// Result of quoting a set of client-facing identifiers. A slug missing from
/// `prices` is unavailable, never zero.
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub prices: BTreeMap<String, i64>,
    pub total: i64,
    pub complete: bool,
    pub unavailable: Vec<String>,
}

/// A package total. `complete` is false when any constituent price was
/// unknown, in which case `total` is the un-discounted partial sum.
#[derive(Debug, Clone, Serialize)]
pub struct PackagePrice {
    pub total: i64,
    pub complete: bool,
}
