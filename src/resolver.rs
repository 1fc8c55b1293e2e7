use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{ReferenceCache, SourceTable};
use crate::candidates::{municipality_candidates, province_candidates};
use crate::config::ResolverConfig;
use crate::errors::{GeoError, GeoResult};
use crate::geocoder::{GeocodeHit, Geocoder, NominatimClient};
use crate::matching::{match_province, MatchStrategy, MunicipalityMatcher};
use crate::models::{
    parse_house_number, AddressQuery, Coordinates, LocationSelection, MunicipalityRef, ProvinceRef,
    ResolutionTrace, ResolvedAddress, StoredLocation,
};
use crate::registry::{HttpRegistryClient, ReferenceRegistry};

pub const ADDRESS_NOT_AVAILABLE: &str = "Address not available";

const SEARCH_LIMIT: u8 = 1;

pub struct GeoResolver {
    cache: ReferenceCache,
    geocoder: Arc<dyn Geocoder>,
    country_name: String,
}

#[derive(Debug, Default)]
struct Linked {
    province: Option<ProvinceRef>,
    municipality: Option<MunicipalityRef>,
    raw_province: Option<String>,
    raw_municipality: Option<String>,
    trace: ResolutionTrace,
}

impl Linked {
    fn province_id(&self) -> Option<String> {
        self.province.as_ref().map(|p| p.id.clone())
    }

    fn province_name(&self) -> Option<String> {
        self.province
            .as_ref()
            .map(|p| p.name.clone())
            .or_else(|| self.raw_province.clone())
    }

    fn municipality_id(&self) -> Option<String> {
        self.municipality.as_ref().map(|m| m.id.clone())
    }

    fn municipality_name(&self) -> Option<String> {
        self.municipality
            .as_ref()
            .map(|m| m.name.clone())
            .or_else(|| self.raw_municipality.clone())
    }
}

impl GeoResolver {
    pub fn new(config: &ResolverConfig) -> GeoResult<Self> {
        let registry = Arc::new(HttpRegistryClient::new(config)?);
        let geocoder = Arc::new(NominatimClient::new(config)?);
        Ok(Self::with_collaborators(
            registry,
            geocoder,
            SourceTable::from_config(config),
            config.country_name.clone(),
        ))
    }

    pub fn with_collaborators(
        registry: Arc<dyn ReferenceRegistry>,
        geocoder: Arc<dyn Geocoder>,
        sources: SourceTable,
        country_name: impl Into<String>,
    ) -> Self {
        Self {
            cache: ReferenceCache::new(registry, sources),
            geocoder,
            country_name: country_name.into(),
        }
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    pub async fn provinces(&self) -> GeoResult<Arc<Vec<ProvinceRef>>> {
        self.cache.provinces().await
    }

    pub async fn municipalities(&self, province_id: Option<&str>) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        self.cache.municipalities(province_id).await
    }

    pub async fn municipality_by_id(&self, id: &str) -> GeoResult<Option<MunicipalityRef>> {
        self.cache.municipality_by_id(id).await
    }

    pub async fn resolve_from_coordinates(&self, lat: f64, lon: f64) -> GeoResult<ResolvedAddress> {
        let at = Coordinates::new(lat, lon);
        if !at.is_valid() {
            return Err(GeoError::InvalidInput(format!(
                "coordinates out of range: {lat}, {lon}"
            )));
        }
        self.reverse(at)
            .await
            .map_err(|err| err.with_context(format!("reverse geocoding {lat}, {lon}")))
    }

    pub async fn resolve_from_address(&self, query: &AddressQuery) -> GeoResult<Vec<ResolvedAddress>> {
        if query.street.trim().is_empty() {
            return Err(GeoError::InvalidInput("street is required".into()));
        }
        let text = query.to_query_text(&self.country_name);
        self.forward(query, &text)
            .await
            .map_err(|err| err.with_context(format!("geocoding address {text:?}")))
    }

    pub async fn resolve_stored_location(&self, stored: &StoredLocation) -> GeoResult<LocationSelection> {
        self.relink(stored)
            .await
            .map_err(|err| err.with_context("re-resolving stored location"))
    }

    async fn reverse(&self, at: Coordinates) -> GeoResult<ResolvedAddress> {
        let hit = self.geocoder.reverse(at).await?;
        let Some(address) = hit.address.as_ref() else {
            info!(lat = at.lat, lon = at.lon, "geocoder returned no address components");
            return Ok(ResolvedAddress {
                full_text: hit
                    .display_name
                    .clone()
                    .unwrap_or_else(|| ADDRESS_NOT_AVAILABLE.to_string()),
                street: String::new(),
                house_number: None,
                province_id: None,
                province_name: None,
                municipality_id: None,
                municipality_name: None,
                postal_code: None,
                country_code: None,
                country_name: None,
                location: at,
                trace: ResolutionTrace::default(),
            });
        };

        let linked = self.link(&hit, None, None).await?;
        let resolved = ResolvedAddress {
            full_text: hit
                .display_name
                .clone()
                .unwrap_or_else(|| ADDRESS_NOT_AVAILABLE.to_string()),
            street: address.road.clone().unwrap_or_default(),
            house_number: parse_house_number(address.house_number.as_deref()),
            province_id: linked.province_id(),
            province_name: linked.province_name(),
            municipality_id: linked.municipality_id(),
            municipality_name: linked.municipality_name(),
            postal_code: address.postcode.clone(),
            country_code: address.country_code.clone(),
            country_name: address.country.clone(),
            location: hit.location.unwrap_or(at),
            trace: linked.trace,
        };
        if !resolved.is_fully_resolved() {
            warn!(
                lat = at.lat,
                lon = at.lon,
                province = ?resolved.province_name,
                municipality = ?resolved.municipality_name,
                "partial resolution"
            );
        }
        Ok(resolved)
    }

    async fn forward(&self, query: &AddressQuery, text: &str) -> GeoResult<Vec<ResolvedAddress>> {
        let hits = self.geocoder.search(text, SEARCH_LIMIT).await?;
        let Some(hit) = hits.into_iter().next() else {
            info!(query = text, "geocoder found no match");
            return Ok(Vec::new());
        };
        let Some(location) = hit.location else {
            warn!(query = text, "geocoder result has no usable coordinates");
            return Ok(Vec::new());
        };

        let linked = self
            .link(
                &hit,
                non_blank(query.province_name.as_deref()),
                non_blank(query.municipality_name.as_deref()),
            )
            .await?;
        let address = hit.address.clone().unwrap_or_default();
        let resolved = ResolvedAddress {
            full_text: hit.display_name.clone().unwrap_or_else(|| text.to_string()),
            street: address
                .road
                .clone()
                .unwrap_or_else(|| query.street.trim().to_string()),
            house_number: parse_house_number(address.house_number.as_deref())
                .or_else(|| parse_house_number(query.house_number.as_deref())),
            province_id: linked.province_id(),
            province_name: linked.province_name(),
            municipality_id: linked.municipality_id(),
            municipality_name: linked.municipality_name(),
            postal_code: address.postcode,
            country_code: address.country_code,
            country_name: address.country.or_else(|| Some(self.country_name.clone())),
            location,
            trace: linked.trace,
        };
        if !resolved.is_fully_resolved() {
            warn!(
                query = text,
                province = ?resolved.province_name,
                municipality = ?resolved.municipality_name,
                "partial resolution"
            );
        }
        Ok(vec![resolved])
    }

    async fn link(
        &self,
        hit: &GeocodeHit,
        province_fallback: Option<&str>,
        municipality_fallback: Option<&str>,
    ) -> GeoResult<Linked> {
        let provinces = self.cache.provinces().await?;
        let province_names = province_candidates(hit, province_fallback);
        let municipality_names = municipality_candidates(hit, municipality_fallback);

        let mut linked = Linked {
            raw_province: province_names.first().cloned(),
            raw_municipality: municipality_names.first().cloned(),
            ..Linked::default()
        };
        if let Some(matched) = match_province(&provinces, None, &province_names) {
            linked.province = Some(matched.entry.clone());
            linked.trace.province = Some(matched.strategy);
        }
        if municipality_names.is_empty() {
            return Ok(linked);
        }

        match linked.province.clone() {
            Some(province) => {
                let municipalities = self.cache.municipalities(Some(&province.id)).await?;
                let matcher = MunicipalityMatcher::new(&municipalities, Some(&province));
                if let Some(matched) = matcher.resolve(None, &municipality_names) {
                    linked.municipality = Some(matched.entry.clone());
                    linked.trace.municipality = Some(matched.strategy);
                }
            }
            None => {
                let nationwide = self.cache.municipalities(None).await?;
                let matcher = MunicipalityMatcher::new(&nationwide, None);
                if let Some(matched) = matcher.resolve(None, &municipality_names) {
                    linked.province = provinces
                        .iter()
                        .find(|p| p.id == matched.entry.province_id)
                        .cloned();
                    debug!(
                        municipality_id = matched.entry.id.as_str(),
                        province_id = matched.entry.province_id.as_str(),
                        "province back-filled from nationwide match"
                    );
                    linked.municipality = Some(matched.entry.clone());
                    linked.trace.municipality = Some(matched.strategy);
                }
            }
        }
        Ok(linked)
    }

    async fn relink(&self, stored: &StoredLocation) -> GeoResult<LocationSelection> {
        let provinces = self.cache.provinces().await?;
        let stored_id = non_blank(stored.municipality_id.as_deref());

        if let Some(id) = stored_id {
            if let Some(municipality) = self.cache.municipality_by_id(id).await? {
                let province = provinces
                    .iter()
                    .find(|p| p.id == municipality.province_id)
                    .cloned();
                return Ok(LocationSelection {
                    province,
                    municipality: Some(municipality),
                    strategy: Some(MatchStrategy::DirectId),
                });
            }
        }

        let province_names: Vec<String> = non_blank(stored.province_name.as_deref())
            .map(str::to_string)
            .into_iter()
            .collect();
        let municipality_names: Vec<String> = non_blank(stored.municipality_name.as_deref())
            .map(str::to_string)
            .into_iter()
            .collect();
        let province = match_province(&provinces, None, &province_names).map(|m| m.entry.clone());

        let mut selection = LocationSelection {
            province: province.clone(),
            ..LocationSelection::default()
        };
        if stored_id.is_none() && municipality_names.is_empty() {
            return Ok(selection);
        }

        match province {
            Some(province) => {
                let municipalities = self.cache.municipalities(Some(&province.id)).await?;
                let matcher = MunicipalityMatcher::new(&municipalities, Some(&province));
                if let Some(matched) = matcher.resolve(stored_id, &municipality_names) {
                    selection.municipality = Some(matched.entry.clone());
                    selection.strategy = Some(matched.strategy);
                }
            }
            None if !municipality_names.is_empty() => {
                let nationwide = self.cache.municipalities(None).await?;
                let matcher = MunicipalityMatcher::new(&nationwide, None);
                if let Some(matched) = matcher.resolve(None, &municipality_names) {
                    selection.province = provinces
                        .iter()
                        .find(|p| p.id == matched.entry.province_id)
                        .cloned();
                    selection.municipality = Some(matched.entry.clone());
                    selection.strategy = Some(matched.strategy);
                }
            }
            None => {}
        }
        Ok(selection)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
