use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::db::queries;
use crate::models::{PackagePrice, PriceQuote};

/// Sandbox identifier used for payment-gateway integration checks. The only
/// slug allowed to fall back to a fixed nominal price when the catalog has
/// no entry; the catalog still wins when one exists.
pub const TEST_FIXTURE_SLUG: &str = "gateway-sandbox-check";
pub const TEST_FIXTURE_PRICE_MINOR: i64 = 100;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

const PACKAGE_DISCOUNT_PERCENT: i64 = 15;

/// Canonical translation from client-facing slugs to catalog identifiers.
/// Many-to-one: legacy display slugs map onto the same catalog entry.
const SLUG_TO_CATALOG: &[(&str, &str)] = &[
    ("individual-counselling", "SVC-COUNSEL-IND"),
    ("one-on-one-session", "SVC-COUNSEL-IND"),
    ("couples-counselling", "SVC-COUNSEL-CPL"),
    ("couple-therapy", "SVC-COUNSEL-CPL"),
    ("family-counselling", "SVC-COUNSEL-FAM"),
    ("legal-consultation", "SVC-LEGAL-CONSULT"),
    ("legal-advice-call", "SVC-LEGAL-CONSULT"),
    ("document-review", "SVC-LEGAL-DOC"),
    ("wellness-package", "PKG-WELLNESS"),
    ("healing-starter-package", "PKG-HEALING-START"),
    ("gateway-sandbox-check", "SVC-GATEWAY-TEST"),
];

/// Packages priced from their constituent services when the catalog carries
/// no package entry of its own.
const PACKAGE_CONSTITUENTS: &[(&str, &[&str])] = &[
    (
        "PKG-WELLNESS",
        &["SVC-COUNSEL-IND", "SVC-COUNSEL-IND", "SVC-COUNSEL-IND"],
    ),
    (
        "PKG-HEALING-START",
        &["SVC-COUNSEL-IND", "SVC-COUNSEL-CPL", "SVC-LEGAL-DOC"],
    ),
];

pub fn catalog_id_for(slug: &str) -> Option<&'static str> {
    SLUG_TO_CATALOG
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, c)| *c)
}

fn constituents_for(catalog_id: &str) -> Option<&'static [&'static str]> {
    PACKAGE_CONSTITUENTS
        .iter()
        .find(|(p, _)| *p == catalog_id)
        .map(|(_, c)| *c)
}

/// 15% off, rounded to the nearest minor unit.
fn discounted(sum: i64) -> i64 {
    (sum * (100 - PACKAGE_DISCOUNT_PERCENT) + 50) / 100
}

/// Short-lived price cache, owned by the composition root and shared through
/// `AppState`. Invalidated explicitly after admin price mutations.
pub struct PriceCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, (i64, Instant)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, catalog_id: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(catalog_id)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(price, _)| *price)
    }

    pub fn put(&self, catalog_id: &str, price_minor: i64) {
        self.inner
            .lock()
            .unwrap()
            .insert(catalog_id.to_string(), (price_minor, Instant::now()));
    }

    pub fn invalidate_all(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Fetch active prices for a set of catalog ids, cache first. On a catalog
/// query failure the cached subset is returned as-is; missing ids simply
/// stay missing.
fn lookup(
    conn: &Connection,
    cache: &PriceCache,
    catalog_ids: &[&str],
) -> HashMap<String, i64> {
    let mut found: HashMap<String, i64> = HashMap::new();
    let mut missing: Vec<String> = vec![];

    for id in catalog_ids {
        match cache.get(id) {
            Some(price) => {
                found.insert(id.to_string(), price);
            }
            None => missing.push(id.to_string()),
        }
    }

    if !missing.is_empty() {
        match queries::get_prices(conn, &missing) {
            Ok(entries) => {
                for entry in entries {
                    if entry.active {
                        cache.put(&entry.catalog_id, entry.price_minor);
                        found.insert(entry.catalog_id, entry.price_minor);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "price catalog query failed, serving cached subset");
            }
        }
    }

    found
}

/// Price a package catalog id: a direct catalog entry wins; otherwise the
/// constituent sum with the package discount, applied only when every
/// constituent price is known. Partial data yields the un-discounted partial
/// sum with `complete = false` rather than a silently wrong figure.
pub fn package_price(
    conn: &Connection,
    cache: &PriceCache,
    package_catalog_id: &str,
) -> Option<PackagePrice> {
    let direct = lookup(conn, cache, &[package_catalog_id]);
    if let Some(price) = direct.get(package_catalog_id) {
        return Some(PackagePrice {
            total: *price,
            complete: true,
        });
    }

    let constituents = constituents_for(package_catalog_id)?;
    let prices = lookup(conn, cache, constituents);

    let mut sum = 0i64;
    let mut known = 0usize;
    for c in constituents {
        if let Some(p) = prices.get(*c) {
            sum += p;
            known += 1;
        }
    }

    if known == 0 {
        return None;
    }
    if known == constituents.len() {
        Some(PackagePrice {
            total: discounted(sum),
            complete: true,
        })
    } else {
        Some(PackagePrice {
            total: sum,
            complete: false,
        })
    }
}

/// Quote a set of client-facing slugs. Slugs without a resolvable price end
/// up in `unavailable` and are excluded from `prices`. Absence is the only
/// representation of "no price", so callers can never mistake it for free.
pub fn quote(conn: &Connection, cache: &PriceCache, slugs: &[String]) -> PriceQuote {
    let mut prices: BTreeMap<String, i64> = BTreeMap::new();
    let mut unavailable: Vec<String> = vec![];
    let mut partial_sum = 0i64;
    let mut complete = true;

    for slug in slugs {
        let Some(catalog_id) = catalog_id_for(slug) else {
            tracing::warn!(slug = %slug, "unknown service slug in quote request");
            unavailable.push(slug.clone());
            complete = false;
            continue;
        };

        if constituents_for(catalog_id).is_some() {
            match package_price(conn, cache, catalog_id) {
                Some(pp) if pp.complete => {
                    prices.insert(slug.clone(), pp.total);
                }
                Some(pp) => {
                    partial_sum += pp.total;
                    unavailable.push(slug.clone());
                    complete = false;
                }
                None => {
                    unavailable.push(slug.clone());
                    complete = false;
                }
            }
            continue;
        }

        let found = lookup(conn, cache, &[catalog_id]);
        match found.get(catalog_id) {
            Some(price) => {
                prices.insert(slug.clone(), *price);
            }
            None if slug == TEST_FIXTURE_SLUG => {
                prices.insert(slug.clone(), TEST_FIXTURE_PRICE_MINOR);
            }
            None => {
                unavailable.push(slug.clone());
                complete = false;
            }
        }
    }

    let total = prices.values().sum::<i64>() + partial_sum;
    PriceQuote {
        prices,
        total,
        complete,
        unavailable,
    }
}
