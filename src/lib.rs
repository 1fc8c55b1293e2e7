pub mod cache;
pub mod candidates;
pub mod commands;
pub mod config;
pub mod errors;
pub mod geocoder;
mod http;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod resolver;
#[cfg(test)]
mod testing;

use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::cache::{MunicipalitySource, ReferenceCache, SourceTable};
pub use crate::config::ResolverConfig;
pub use crate::errors::{GeoError, GeoResult};
pub use crate::geocoder::{AddressCandidate, GeocodeHit, Geocoder, NominatimClient};
pub use crate::models::{
    AddressQuery, Coordinates, LocationSelection, MunicipalityRef, ProvinceRef, ResolvedAddress,
    StoredLocation,
};
pub use crate::registry::{HttpRegistryClient, ReferenceRegistry};
pub use crate::resolver::GeoResolver;

pub struct GeoState {
    config: ResolverConfig,
    resolver: GeoResolver,
}

impl GeoState {
    pub fn initialize() -> GeoResult<Self> {
        init_tracing();
        Self::with_config(ResolverConfig::from_env())
    }

    pub fn with_config(config: ResolverConfig) -> GeoResult<Self> {
        let resolver = GeoResolver::new(&config)?;
        info!(
            registry = config.registry_base_url.as_str(),
            geocoder = config.geocoder_base_url.as_str(),
            locality_sources = ?config.locality_source_provinces,
            "geo resolver ready"
        );
        Ok(Self { config, resolver })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolver(&self) -> &GeoResolver {
        &self.resolver
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,venue_geo_resolver=debug"));
        if let Err(err) = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
        {
            warn!(%err, "keeping the host's tracing subscriber");
        }
    });
}
