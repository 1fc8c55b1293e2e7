use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::errors::GeoResult;
use crate::http::{build_client, endpoint, get_json, parse_base_url};
use crate::models::{Coordinates, MunicipalityRef, ProvinceRef};

#[async_trait]
pub trait ReferenceRegistry: Send + Sync {
    async fn provinces(&self) -> GeoResult<Vec<ProvinceRef>>;

    async fn municipalities(&self, province_id: Option<&str>) -> GeoResult<Vec<MunicipalityRef>>;

    async fn localities(&self, province_id: &str) -> GeoResult<Vec<MunicipalityRef>>;
}

pub struct HttpRegistryClient {
    http: Client,
    base_url: Url,
    max_results: u32,
}

impl HttpRegistryClient {
    pub fn new(config: &ResolverConfig) -> GeoResult<Self> {
        Ok(Self {
            http: build_client(&config.geocoder_user_agent, config.upstream_timeout_ms)?,
            base_url: parse_base_url(&config.registry_base_url)?,
            max_results: config.registry_max_results,
        })
    }

    fn list_url(&self, resource: &str, province_id: Option<&str>) -> GeoResult<Url> {
        let mut url = endpoint(&self.base_url, resource)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(province_id) = province_id {
                query.append_pair("provincia", province_id);
            }
            query.append_pair("max", &self.max_results.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl ReferenceRegistry for HttpRegistryClient {
    async fn provinces(&self) -> GeoResult<Vec<ProvinceRef>> {
        let url = self.list_url("provincias", None)?;
        let response: ProvincesResponse = get_json(&self.http, url, "fetch provinces").await?;
        let provinces: Vec<ProvinceRef> = response
            .provincias
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawProvince::into_ref)
            .collect();
        debug!(count = provinces.len(), "provinces fetched");
        Ok(provinces)
    }

    async fn municipalities(&self, province_id: Option<&str>) -> GeoResult<Vec<MunicipalityRef>> {
        let url = self.list_url("municipios", province_id)?;
        let operation = match province_id {
            Some(id) => format!("fetch municipalities for province {id}"),
            None => "fetch municipalities".to_string(),
        };
        let response: MunicipalitiesResponse = get_json(&self.http, url, &operation).await?;
        let municipalities: Vec<MunicipalityRef> = response
            .municipios
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawDivision::into_ref)
            .collect();
        debug!(count = municipalities.len(), province_id, "municipalities fetched");
        Ok(municipalities)
    }

    async fn localities(&self, province_id: &str) -> GeoResult<Vec<MunicipalityRef>> {
        let url = self.list_url("localidades", Some(province_id))?;
        let operation = format!("fetch localities for province {province_id}");
        let response: LocalitiesResponse = get_json(&self.http, url, &operation).await?;
        let localities: Vec<MunicipalityRef> = response
            .localidades
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawDivision::into_ref)
            .collect();
        debug!(count = localities.len(), province_id, "localities fetched");
        Ok(localities)
    }
}

#[derive(Deserialize)]
struct ProvincesResponse {
    provincias: Option<Vec<RawProvince>>,
}

#[derive(Deserialize)]
struct MunicipalitiesResponse {
    municipios: Option<Vec<RawDivision>>,
}

#[derive(Deserialize)]
struct LocalitiesResponse {
    localidades: Option<Vec<RawDivision>>,
}

#[derive(Deserialize)]
struct RawCentroid {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawEntityRef {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RawProvince {
    id: Option<String>,
    nombre: Option<String>,
    centroide: Option<RawCentroid>,
}

impl RawProvince {
    fn into_ref(self) -> Option<ProvinceRef> {
        let (Some(id), Some(name)) = (self.id, self.nombre) else {
            warn!("skipping registry province without id or name");
            return None;
        };
        let Some(centroid) = self.centroide else {
            warn!(province_id = id.as_str(), "skipping registry province without centroid");
            return None;
        };
        Some(ProvinceRef {
            id,
            name,
            centroid: Coordinates::new(centroid.lat, centroid.lon),
        })
    }
}

#[derive(Deserialize)]
struct RawDivision {
    id: Option<String>,
    nombre: Option<String>,
    categoria: Option<String>,
    centroide: Option<RawCentroid>,
    provincia: Option<RawEntityRef>,
}

impl RawDivision {
    fn into_ref(self) -> Option<MunicipalityRef> {
        let province_id = self.provincia.and_then(|p| p.id);
        let (Some(id), Some(name), Some(province_id)) = (self.id, self.nombre, province_id) else {
            warn!("skipping registry division without id, name or province");
            return None;
        };
        Some(MunicipalityRef {
            id,
            name,
            province_id,
            centroid: self.centroide.map(|c| Coordinates::new(c.lat, c.lon)),
            category: self.categoria,
        })
    }
}
