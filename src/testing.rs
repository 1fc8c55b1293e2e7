use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{GeoError, GeoResult};
use crate::geocoder::{GeocodeHit, Geocoder};
use crate::models::{Coordinates, MunicipalityRef, ProvinceRef};
use crate::registry::ReferenceRegistry;

pub(crate) fn province(id: &str, name: &str) -> ProvinceRef {
    ProvinceRef {
        id: id.into(),
        name: name.into(),
        centroid: Coordinates::new(-34.0, -64.0),
    }
}

pub(crate) fn municipality(id: &str, name: &str, province_id: &str) -> MunicipalityRef {
    MunicipalityRef {
        id: id.into(),
        name: name.into(),
        province_id: province_id.into(),
        centroid: Some(Coordinates::new(-34.0, -64.0)),
        category: None,
    }
}

pub(crate) fn locality(id: &str, name: &str, province_id: &str) -> MunicipalityRef {
    MunicipalityRef {
        category: Some("Localidad simple".into()),
        ..municipality(id, name, province_id)
    }
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    pub provinces: Vec<ProvinceRef>,
    pub municipalities: Vec<MunicipalityRef>,
    pub localities: Vec<MunicipalityRef>,
    pub calls: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

impl FakeRegistry {
    pub(crate) fn argentina() -> Self {
        Self {
            provinces: vec![
                province("02", "Ciudad Autónoma de Buenos Aires"),
                province("06", "Buenos Aires"),
                province("14", "Córdoba"),
                province("86", "Santiago del Estero"),
            ],
            municipalities: vec![
                municipality("060441", "La Plata", "06"),
                municipality("060252", "Ensenada", "06"),
                municipality("140014", "Córdoba", "14"),
                municipality("140266", "Villa Hernando Sur", "14"),
                municipality("140245", "Hernando", "14"),
                municipality("140350", "San Roque", "14"),
                municipality("860007", "La Banda", "86"),
                // Points at a province the registry does not list.
                municipality("990001", "Orphan", "99"),
            ],
            localities: vec![
                locality("02000010000", "Ciudad Autónoma de Buenos Aires", "02"),
                locality("86049010000", "La Banda", "86"),
                locality("86077010000", "Capital", "86"),
                locality("86077020000", "Santiago del Estero", "86"),
                locality("99000010000", "Ghost", "99"),
            ],
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: String) -> GeoResult<()> {
        let failing = self.failing.load(Ordering::SeqCst);
        let operation = call.clone();
        self.calls.lock().push(call);
        if failing {
            return Err(GeoError::upstream(operation, Some(503), None));
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceRegistry for FakeRegistry {
    async fn provinces(&self) -> GeoResult<Vec<ProvinceRef>> {
        self.record("provinces".into())?;
        Ok(self.provinces.clone())
    }

    async fn municipalities(&self, province_id: Option<&str>) -> GeoResult<Vec<MunicipalityRef>> {
        self.record(format!("municipalities:{}", province_id.unwrap_or("*")))?;
        Ok(self
            .municipalities
            .iter()
            .filter(|m| province_id.map_or(true, |id| m.province_id == id))
            .cloned()
            .collect())
    }

    async fn localities(&self, province_id: &str) -> GeoResult<Vec<MunicipalityRef>> {
        self.record(format!("localities:{province_id}"))?;
        Ok(self
            .localities
            .iter()
            .filter(|l| l.province_id == province_id)
            .cloned()
            .collect())
    }
}

// `None` makes the corresponding call fail as if the provider timed out.
#[derive(Default)]
pub(crate) struct FakeGeocoder {
    pub reverse_hit: Option<GeocodeHit>,
    pub search_hits: Option<Vec<GeocodeHit>>,
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse(&self, at: Coordinates) -> GeoResult<GeocodeHit> {
        self.queries.lock().push(format!("{}, {}", at.lat, at.lon));
        self.reverse_hit
            .clone()
            .ok_or_else(|| GeoError::upstream("reverse geocode", None, Some("operation timed out".into())))
    }

    async fn search(&self, query: &str, _limit: u8) -> GeoResult<Vec<GeocodeHit>> {
        self.queries.lock().push(query.to_string());
        self.search_hits
            .clone()
            .ok_or_else(|| GeoError::upstream("search address", None, Some("operation timed out".into())))
    }
}
