use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_REGISTRY_BASE_URL: &str = "https://apis.datos.gob.ar/georef/api";
const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_GEOCODER_USER_AGENT: &str = "venue-geo-resolver/0.1.0 (ops@venue-geo-resolver.example)";
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_REGISTRY_MAX_RESULTS: u32 = 5_000;
const DEFAULT_COUNTRY: &str = "Argentina";
// Santiago del Estero and the Autonomous City of Buenos Aires.
const DEFAULT_LOCALITY_SOURCE_PROVINCES: &str = "86,02";

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub registry_base_url: String,
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_api_key: Option<SecretString>,
    pub geocoder_rate_limit_qps: u32,
    pub upstream_timeout_ms: u64,
    pub registry_max_results: u32,
    pub country_name: String,
    pub locality_source_provinces: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicResolverConfig {
    pub registry_base_url: String,
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_rate_limit_qps: u32,
    pub upstream_timeout_ms: u64,
    pub registry_max_results: u32,
    pub country_name: String,
    pub locality_source_provinces: Vec<String>,
    pub has_geocoder_api_key: bool,
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            registry_base_url: parse_string("GEOREF_API_BASE_URL", DEFAULT_REGISTRY_BASE_URL),
            geocoder_base_url: parse_string("GEOCODER_API_BASE_URL", DEFAULT_GEOCODER_BASE_URL),
            geocoder_user_agent: parse_string("GEOCODER_USER_AGENT", DEFAULT_GEOCODER_USER_AGENT),
            geocoder_api_key: env::var("GEOCODER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocoder_rate_limit_qps: parse_u32("GEOCODER_RATE_LIMIT_QPS", 1).max(1),
            upstream_timeout_ms: parse_u64("UPSTREAM_TIMEOUT_MS", DEFAULT_UPSTREAM_TIMEOUT_MS).max(1),
            registry_max_results: parse_u32("REGISTRY_MAX_RESULTS", DEFAULT_REGISTRY_MAX_RESULTS)
                .max(1),
            country_name: parse_string("GEOCODER_COUNTRY", DEFAULT_COUNTRY),
            locality_source_provinces: parse_list(
                "LOCALITY_SOURCE_PROVINCES",
                DEFAULT_LOCALITY_SOURCE_PROVINCES,
            ),
        }
    }

    pub fn public_profile(&self) -> PublicResolverConfig {
        PublicResolverConfig {
            registry_base_url: self.registry_base_url.clone(),
            geocoder_base_url: self.geocoder_base_url.clone(),
            geocoder_user_agent: self.geocoder_user_agent.clone(),
            geocoder_rate_limit_qps: self.geocoder_rate_limit_qps,
            upstream_timeout_ms: self.upstream_timeout_ms,
            registry_max_results: self.registry_max_results,
            country_name: self.country_name.clone(),
            locality_source_provinces: self.locality_source_provinces.clone(),
            has_geocoder_api_key: self.geocoder_api_key.is_some(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_base_url: DEFAULT_REGISTRY_BASE_URL.to_string(),
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            geocoder_user_agent: DEFAULT_GEOCODER_USER_AGENT.to_string(),
            geocoder_api_key: None,
            geocoder_rate_limit_qps: 1,
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            registry_max_results: DEFAULT_REGISTRY_MAX_RESULTS,
            country_name: DEFAULT_COUNTRY.to_string(),
            locality_source_provinces: split_list(DEFAULT_LOCALITY_SOURCE_PROVINCES),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_list(key: &str, default: &str) -> Vec<String> {
    match env::var(key) {
        Ok(value) => split_list(&value),
        Err(_) => split_list(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
