use serde::{Deserialize, Serialize};

use crate::matching::MatchStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceRef {
    pub id: String,
    pub name: String,
    pub centroid: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityRef {
    pub id: String,
    pub name: String,
    pub province_id: String,
    pub centroid: Option<Coordinates>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionTrace {
    pub province: Option<MatchStrategy>,
    pub municipality: Option<MatchStrategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAddress {
    pub full_text: String,
    pub street: String,
    pub house_number: Option<u32>,
    pub province_id: Option<String>,
    pub province_name: Option<String>,
    pub municipality_id: Option<String>,
    pub municipality_name: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub location: Coordinates,
    pub trace: ResolutionTrace,
}

impl ResolvedAddress {
    pub fn is_fully_resolved(&self) -> bool {
        self.province_id.is_some() && self.municipality_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressQuery {
    pub street: String,
    pub house_number: Option<String>,
    pub province_name: Option<String>,
    pub municipality_name: Option<String>,
}

impl AddressQuery {
    pub fn new(
        street: impl Into<String>,
        house_number: Option<&str>,
        province_name: Option<&str>,
        municipality_name: Option<&str>,
    ) -> Self {
        Self {
            street: street.into(),
            house_number: house_number.map(str::to_string),
            province_name: province_name.map(str::to_string),
            municipality_name: municipality_name.map(str::to_string),
        }
    }

    pub fn to_query_text(&self, country: &str) -> String {
        let mut query = self.street.trim().to_string();
        if let Some(number) = non_empty(self.house_number.as_deref()) {
            query.push(' ');
            query.push_str(number);
        }
        for segment in [
            non_empty(self.municipality_name.as_deref()),
            non_empty(self.province_name.as_deref()),
            non_empty(Some(country)),
        ]
        .into_iter()
        .flatten()
        {
            query.push_str(", ");
            query.push_str(segment);
        }
        query
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoredLocation {
    pub municipality_id: Option<String>,
    pub municipality_name: Option<String>,
    pub province_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationSelection {
    pub province: Option<ProvinceRef>,
    pub municipality: Option<MunicipalityRef>,
    pub strategy: Option<MatchStrategy>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Leading digits of a house number ("1234", "1234 bis", "12B"); `None` for "S/N".
pub fn parse_house_number(raw: Option<&str>) -> Option<u32> {
    let digits: String = raw?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
