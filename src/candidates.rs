use once_cell::sync::Lazy;
use regex::Regex;

use crate::geocoder::{AddressCandidate, GeocodeHit};
use crate::normalize::{fold, normalize, NameKind};

static MUNICIPIO_IN_DISPLAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bmunicipio de\s+([^,]+)").expect("municipio pattern"));

// Argentine postal codes, old (4 digits) and CPA (B1900ABC).
static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]?\d{4}[a-z]{0,3}$").expect("postal code pattern"));

const ADMINISTRATIVE_KEYWORDS: [&str; 6] = [
    "departamento",
    "partido",
    "pedania",
    "provincia de",
    "comuna",
    "localidad censal",
];

pub fn province_candidates(hit: &GeocodeHit, fallback: Option<&str>) -> Vec<String> {
    let address = hit.address.as_ref();
    let mut names = CandidateList::new(NameKind::Province);
    names.push(address.and_then(|a| a.state.as_deref()));
    names.push(address.and_then(|a| a.province.as_deref()));
    if names.is_empty() {
        names.push(fallback);
    }
    names.into_vec()
}

pub fn municipality_candidates(hit: &GeocodeHit, fallback: Option<&str>) -> Vec<String> {
    let mut names = CandidateList::new(NameKind::City);
    if let Some(address) = &hit.address {
        for field in locality_fields(address) {
            names.push(field);
        }
    }
    if names.is_empty() {
        names.push(fallback);
    }
    if let Some(display) = hit.display_name.as_deref() {
        names.push(municipio_from_display(display).as_deref());
        names.push(first_place_segment(display, hit.address.as_ref()));
    }
    names.into_vec()
}

fn locality_fields(address: &AddressCandidate) -> [Option<&str>; 11] {
    [
        address.municipality.as_deref(),
        address.city.as_deref(),
        address.town.as_deref(),
        address.village.as_deref(),
        address.suburb.as_deref(),
        address.county.as_deref(),
        address.locality.as_deref(),
        address.local_administrative_area.as_deref(),
        address.hamlet.as_deref(),
        address.city_district.as_deref(),
        address.state_district.as_deref(),
    ]
}

fn municipio_from_display(display: &str) -> Option<String> {
    MUNICIPIO_IN_DISPLAY
        .captures(display)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().trim().to_string())
}

fn first_place_segment<'a>(display: &'a str, address: Option<&AddressCandidate>) -> Option<&'a str> {
    let known: Vec<String> = address
        .map(|a| {
            [&a.road, &a.house_number, &a.state, &a.province, &a.country, &a.postcode]
                .into_iter()
                .flatten()
                .map(|value| fold(value))
                .collect()
        })
        .unwrap_or_default();

    display.split(',').map(str::trim).find(|segment| {
        let folded = fold(segment);
        !folded.is_empty()
            && folded.chars().any(char::is_alphabetic)
            && !POSTAL_CODE.is_match(&folded)
            && !known.contains(&folded)
            && !ADMINISTRATIVE_KEYWORDS
                .iter()
                .any(|keyword| folded.starts_with(keyword))
    })
}

struct CandidateList {
    kind: NameKind,
    names: Vec<String>,
    keys: Vec<String>,
}

impl CandidateList {
    fn new(kind: NameKind) -> Self {
        Self {
            kind,
            names: Vec::new(),
            keys: Vec::new(),
        }
    }

    fn push(&mut self, name: Option<&str>) {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return;
        };
        let key = normalize(name, self.kind);
        if key.is_empty() || self.keys.contains(&key) {
            return;
        }
        self.keys.push(key);
        self.names.push(name.to_string());
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn into_vec(self) -> Vec<String> {
        self.names
    }
}
