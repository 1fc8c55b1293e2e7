use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::errors::GeoResult;
use crate::http::{build_client, endpoint, get_json, parse_base_url};
use crate::models::Coordinates;

const REVERSE_ZOOM: &str = "18";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressCandidate {
    pub road: Option<String>,
    pub house_number: Option<String>,
    pub postcode: Option<String>,
    pub municipality: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub suburb: Option<String>,
    pub county: Option<String>,
    pub locality: Option<String>,
    pub local_administrative_area: Option<String>,
    pub hamlet: Option<String>,
    pub city_district: Option<String>,
    pub state_district: Option<String>,
    pub state: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

impl AddressCandidate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeHit {
    pub display_name: Option<String>,
    pub address: Option<AddressCandidate>,
    pub location: Option<Coordinates>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, at: Coordinates) -> GeoResult<GeocodeHit>;

    async fn search(&self, query: &str, limit: u8) -> GeoResult<Vec<GeocodeHit>>;
}

pub struct NominatimClient {
    http: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    rate_limiter: RateLimiter,
}

impl NominatimClient {
    pub fn new(config: &ResolverConfig) -> GeoResult<Self> {
        Ok(Self {
            http: build_client(&config.geocoder_user_agent, config.upstream_timeout_ms)?,
            base_url: parse_base_url(&config.geocoder_base_url)?,
            api_key: config.geocoder_api_key.clone(),
            rate_limiter: RateLimiter::new(config.geocoder_rate_limit_qps),
        })
    }

    fn url(&self, resource: &str, params: &[(&str, &str)]) -> GeoResult<Url> {
        let mut url = endpoint(&self.base_url, resource)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "json");
            query.append_pair("addressdetails", "1");
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(key) = &self.api_key {
                query.append_pair("key", key.expose_secret());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn reverse(&self, at: Coordinates) -> GeoResult<GeocodeHit> {
        let lat = at.lat.to_string();
        let lon = at.lon.to_string();
        let url = self.url(
            "reverse",
            &[("lat", lat.as_str()), ("lon", lon.as_str()), ("zoom", REVERSE_ZOOM)],
        )?;

        self.rate_limiter.wait().await;
        let operation = format!("reverse geocode {lat}, {lon}");
        let raw: RawPlace = get_json(&self.http, url, &operation).await?;
        if let Some(reason) = &raw.error {
            debug!(reason = reason.as_str(), "geocoder reported no address");
        }
        Ok(raw.into_hit())
    }

    async fn search(&self, query: &str, limit: u8) -> GeoResult<Vec<GeocodeHit>> {
        let limit = limit.max(1).to_string();
        let url = self.url("search", &[("q", query), ("limit", limit.as_str())])?;

        self.rate_limiter.wait().await;
        let operation = format!("search address {query:?}");
        let raw: Vec<RawPlace> = get_json(&self.http, url, &operation).await?;
        Ok(raw.into_iter().map(RawPlace::into_hit).collect())
    }
}

#[derive(Deserialize)]
struct RawPlace {
    display_name: Option<String>,
    address: Option<AddressCandidate>,
    lat: Option<serde_json::Value>,
    lon: Option<serde_json::Value>,
    error: Option<String>,
}

impl RawPlace {
    fn into_hit(self) -> GeocodeHit {
        let location = match (parse_degrees(self.lat), parse_degrees(self.lon)) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)).filter(|c| c.is_valid()),
            _ => None,
        };
        GeocodeHit {
            display_name: self.display_name.filter(|name| !name.trim().is_empty()),
            address: self.address.filter(|address| !address.is_empty()),
            location,
        }
    }
}

// Nominatim sends degrees as strings; other compatible hosts send numbers.
fn parse_degrees(value: Option<serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::String(text) => text.trim().parse().ok(),
        serde_json::Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

/// A caller reserves the next free slot under a short lock and sleeps after
/// releasing it.
pub(crate) struct RateLimiter {
    min_interval_ms: AtomicU64,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub(crate) fn new(qps: u32) -> Self {
        Self {
            min_interval_ms: AtomicU64::new(Self::interval_ms(qps)),
            next_slot: Mutex::new(None),
        }
    }

    fn interval_ms(qps: u32) -> u64 {
        let safe_qps = qps.max(1);
        let interval_ms = (1000_f64 / safe_qps as f64).ceil() as u64;
        interval_ms.max(50)
    }

    fn interval_duration(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.load(Ordering::SeqCst))
    }

    pub(crate) async fn wait(&self) {
        let delay = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = next.map_or(now, |reserved| reserved.max(now));
            *next = Some(slot + self.interval_duration());
            slot.saturating_duration_since(now)
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
