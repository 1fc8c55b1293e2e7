use serde::Serialize;

use crate::cache::CacheStats;
use crate::config::PublicResolverConfig;
use crate::models::{AddressQuery, Coordinates, MunicipalityRef, ProvinceRef, ResolvedAddress};
use crate::GeoState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRef {
    pub id: String,
    pub nombre: String,
}

impl EntityRef {
    fn new(id: Option<&str>, name: Option<&str>) -> Self {
        Self {
            id: id.unwrap_or_default().to_string(),
            nombre: name.unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseNumber {
    pub valor: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressPayload {
    pub nombre_completo: String,
    pub calle: String,
    pub altura: HouseNumber,
    pub provincia: EntityRef,
    pub municipio: EntityRef,
    pub localidad: EntityRef,
    pub localidad_censal: EntityRef,
    pub pais: String,
    pub codigo_postal: Option<String>,
    pub ubicacion: Coordinates,
}

impl From<&ResolvedAddress> for AddressPayload {
    fn from(resolved: &ResolvedAddress) -> Self {
        let municipality = EntityRef::new(
            resolved.municipality_id.as_deref(),
            resolved.municipality_name.as_deref(),
        );
        Self {
            nombre_completo: resolved.full_text.clone(),
            calle: resolved.street.clone(),
            altura: HouseNumber {
                valor: resolved.house_number,
            },
            provincia: EntityRef::new(
                resolved.province_id.as_deref(),
                resolved.province_name.as_deref(),
            ),
            localidad: municipality.clone(),
            localidad_censal: municipality.clone(),
            municipio: municipality,
            pais: resolved.country_name.clone().unwrap_or_default(),
            codigo_postal: resolved.postal_code.clone(),
            ubicacion: resolved.location,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolverHealth {
    pub config: PublicResolverConfig,
    pub cache: CacheStats,
}

pub async fn provinces(state: &GeoState) -> Result<Vec<ProvinceRef>, String> {
    state
        .resolver()
        .provinces()
        .await
        .map(|list| list.to_vec())
        .map_err(|err| err.to_string())
}

pub async fn municipalities(
    state: &GeoState,
    province_id: Option<String>,
) -> Result<Vec<MunicipalityRef>, String> {
    state
        .resolver()
        .municipalities(province_id.as_deref())
        .await
        .map(|list| list.to_vec())
        .map_err(|err| err.to_string())
}

pub async fn address_from_coordinates(
    state: &GeoState,
    lat: f64,
    lon: f64,
) -> Result<AddressPayload, String> {
    state
        .resolver()
        .resolve_from_coordinates(lat, lon)
        .await
        .map(|resolved| AddressPayload::from(&resolved))
        .map_err(|err| err.to_string())
}

pub async fn search_address(
    state: &GeoState,
    street: String,
    number: Option<String>,
    province_name: Option<String>,
    municipality_name: Option<String>,
) -> Result<Vec<AddressPayload>, String> {
    let query = AddressQuery {
        street,
        house_number: number,
        province_name,
        municipality_name,
    };
    state
        .resolver()
        .resolve_from_address(&query)
        .await
        .map(|results| results.iter().map(AddressPayload::from).collect())
        .map_err(|err| err.to_string())
}

pub async fn resolver_health(state: &GeoState) -> Result<ResolverHealth, String> {
    Ok(ResolverHealth {
        config: state.config().public_profile(),
        cache: state.resolver().cache().stats(),
    })
}
