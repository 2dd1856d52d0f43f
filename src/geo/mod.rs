//! IP geolocation enrichment.
//!
//! Sign-in rows missing a country are resolved against an HTTP lookup
//! service before the unusual-location check runs. Lookups fan out over a
//! small worker pool, each worker owning a disjoint batch of addresses, with
//! results merged through a shared TTL cache. An address that cannot be
//! resolved maps to the `"Unknown"` sentinel so the pipeline never stalls on
//! the network.

use crate::config::GeoSettings;
use crate::records::SignInRecord;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Country value recorded when every lookup attempt fails.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

const MAX_WORKERS: usize = 10;
const MIN_WORKERS: usize = 2;
const LOOKUP_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const JITTER_MIN_MS: u64 = 100;
const JITTER_MAX_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Shared country cache with lazy TTL eviction. Entries are checked for
/// staleness on read; nothing scans the map in the background.
pub struct GeoCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl GeoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, ip: &str) -> Option<String> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(ip) {
            Some((country, inserted)) if inserted.elapsed() < self.ttl => Some(country.clone()),
            Some(_) => {
                entries.remove(ip);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, ip: &str, country: &str) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(ip.to_string(), (country.to_string(), Instant::now()));
    }
}

/// Resolves IP addresses to countries over HTTP with caching and retry.
pub struct GeoResolver {
    client: reqwest::Client,
    endpoint: String,
    cache: Arc<GeoCache>,
}

impl GeoResolver {
    pub fn new(settings: &GeoSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            cache: Arc::new(GeoCache::new(Duration::from_secs(settings.cache_ttl_secs))),
        }
    }

    /// One cached lookup. Network failures after the final attempt resolve
    /// to [`UNKNOWN_COUNTRY`]; the sentinel is cached like any other result
    /// so repeated failures do not re-hit the service within the TTL.
    pub async fn lookup(&self, ip: &str) -> String {
        if let Some(country) = self.cache.get(ip) {
            return country;
        }

        let country = self.lookup_uncached(ip).await;
        self.cache.insert(ip, &country);
        country
    }

    async fn lookup_uncached(&self, ip: &str) -> String {
        let url = self.endpoint.replace("{ip}", ip);

        for attempt in 0..LOOKUP_ATTEMPTS {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<LookupResponse>().await {
                        Ok(body) => {
                            if matches!(&body.status, Some(s) if s != "success") {
                                debug!(ip, "lookup service reported failure status");
                                return UNKNOWN_COUNTRY.to_string();
                            }
                            return body
                                .country
                                .filter(|c| !c.trim().is_empty())
                                .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());
                        }
                        Err(e) => {
                            debug!(ip, error = %e, "unparseable lookup response");
                            return UNKNOWN_COUNTRY.to_string();
                        }
                    }
                }
                Ok(resp) => {
                    debug!(
                        ip,
                        status = %resp.status(),
                        attempt = attempt + 1,
                        "lookup returned non-success status"
                    );
                }
                Err(e) => {
                    debug!(ip, error = %e, attempt = attempt + 1, "lookup request failed");
                }
            }
        }

        warn!(ip, "geolocation failed after {} attempts", LOOKUP_ATTEMPTS);
        UNKNOWN_COUNTRY.to_string()
    }
}

/// Worker count for the lookup pool, clamped to [2, 10].
fn worker_count(unique_ips: usize) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS);
    parallelism.clamp(MIN_WORKERS, MAX_WORKERS).min(unique_ips.max(1))
}

/// Pacing delay between consecutive lookups within one worker, derived from
/// a hash of the current time rather than a PRNG dependency.
fn pacing_jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::SystemTime::now().hash(&mut hasher);
    let span = JITTER_MAX_MS - JITTER_MIN_MS;
    Duration::from_millis(JITTER_MIN_MS + hasher.finish() % (span + 1))
}

/// Resolves every distinct address to a country.
///
/// Addresses are deduplicated, split into disjoint contiguous batches, and
/// handed to the pool. Workers share the resolver's cache; every handle is
/// awaited so no lookup outlives the call.
pub async fn resolve_countries(
    resolver: Arc<GeoResolver>,
    ips: Vec<String>,
) -> HashMap<String, String> {
    let mut unique: Vec<String> = Vec::new();
    for ip in ips {
        let ip = ip.trim().to_string();
        if ip.is_empty() || unique.contains(&ip) {
            continue;
        }
        unique.push(ip);
    }

    if unique.is_empty() {
        return HashMap::new();
    }

    let workers = worker_count(unique.len());
    let batch_size = unique.len().div_ceil(workers);
    debug!(
        addresses = unique.len(),
        workers, batch_size, "starting geolocation lookups"
    );

    let mut handles = Vec::new();
    for batch in unique.chunks(batch_size) {
        let batch: Vec<String> = batch.to_vec();
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            let mut resolved = Vec::with_capacity(batch.len());
            for (i, ip) in batch.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pacing_jitter()).await;
                }
                let country = resolver.lookup(ip).await;
                resolved.push((ip.clone(), country));
            }
            resolved
        }));
    }

    let mut countries = HashMap::new();
    for handle in handles {
        match handle.await {
            Ok(resolved) => {
                for (ip, country) in resolved {
                    countries.insert(ip, country);
                }
            }
            Err(e) => warn!(error = %e, "geolocation worker panicked"),
        }
    }
    countries
}

/// Fills in blank sign-in countries from resolved lookups. Returns how many
/// records were enriched.
pub async fn enrich_sign_ins(records: &mut [SignInRecord], settings: &GeoSettings) -> usize {
    let pending: Vec<String> = records
        .iter()
        .filter(|r| r.country.trim().is_empty() && !r.ip_address.trim().is_empty())
        .map(|r| r.ip_address.trim().to_string())
        .collect();

    if pending.is_empty() {
        return 0;
    }

    let resolver = Arc::new(GeoResolver::new(settings));
    let countries = resolve_countries(resolver, pending).await;

    let mut enriched = 0;
    for record in records.iter_mut() {
        if !record.country.trim().is_empty() {
            continue;
        }
        if let Some(country) = countries.get(record.ip_address.trim()) {
            record.country = country.clone();
            enriched += 1;
        }
    }
    enriched
}
