use serde::Serialize;
use tracing::trace;

use crate::models::{MunicipalityRef, ProvinceRef};
use crate::normalize::{normalize, NameKind};

const CAPITAL_KEY: &str = "capital";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    DirectId,
    ExactName,
    CapitalHeuristic,
    Containment,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::DirectId => "direct_id",
            MatchStrategy::ExactName => "exact_name",
            MatchStrategy::CapitalHeuristic => "capital_heuristic",
            MatchStrategy::Containment => "containment",
        }
    }
}

const MUNICIPALITY_PIPELINE: [MatchStrategy; 4] = [
    MatchStrategy::DirectId,
    MatchStrategy::ExactName,
    MatchStrategy::CapitalHeuristic,
    MatchStrategy::Containment,
];

const PROVINCE_PIPELINE: [MatchStrategy; 2] = [MatchStrategy::DirectId, MatchStrategy::ExactName];

#[derive(Debug, Clone, Copy)]
pub struct Matched<'a, T> {
    pub entry: &'a T,
    pub strategy: MatchStrategy,
}

pub struct MunicipalityMatcher<'a> {
    municipalities: &'a [MunicipalityRef],
    keys: Vec<String>,
    province: Option<&'a ProvinceRef>,
}

impl<'a> MunicipalityMatcher<'a> {
    pub fn new(municipalities: &'a [MunicipalityRef], province: Option<&'a ProvinceRef>) -> Self {
        let keys = municipalities
            .iter()
            .map(|m| normalize(&m.name, NameKind::City))
            .collect();
        Self {
            municipalities,
            keys,
            province,
        }
    }

    pub fn resolve(
        &self,
        upstream_id: Option<&str>,
        candidates: &[String],
    ) -> Option<Matched<'a, MunicipalityRef>> {
        let candidate_keys = candidate_keys(candidates, NameKind::City);
        MUNICIPALITY_PIPELINE.iter().find_map(|strategy| {
            let entry = match strategy {
                MatchStrategy::DirectId => self.by_id(upstream_id),
                MatchStrategy::ExactName => self.by_exact_name(&candidate_keys),
                MatchStrategy::CapitalHeuristic => self.by_capital(&candidate_keys),
                MatchStrategy::Containment => self.by_containment(&candidate_keys),
            }?;
            trace!(
                strategy = strategy.as_str(),
                municipality_id = entry.id.as_str(),
                "municipality matched"
            );
            Some(Matched {
                entry,
                strategy: *strategy,
            })
        })
    }

    fn by_id(&self, upstream_id: Option<&str>) -> Option<&'a MunicipalityRef> {
        let id = upstream_id.map(str::trim).filter(|id| !id.is_empty())?;
        self.municipalities.iter().find(|m| m.id == id)
    }

    fn by_exact_name(&self, candidate_keys: &[String]) -> Option<&'a MunicipalityRef> {
        candidate_keys
            .iter()
            .find_map(|candidate| self.first_where(|key| key == candidate.as_str()))
    }

    fn by_capital(&self, candidate_keys: &[String]) -> Option<&'a MunicipalityRef> {
        let province = self.province?;
        let province_key = normalize(&province.name, NameKind::Province);
        if province_key.is_empty() || !candidate_keys.contains(&province_key) {
            return None;
        }
        let prefixed = format!("ciudad de {province_key}");
        self.first_where(|key| key == CAPITAL_KEY || key == province_key || key == prefixed)
    }

    fn by_containment(&self, candidate_keys: &[String]) -> Option<&'a MunicipalityRef> {
        candidate_keys
            .iter()
            .find_map(|candidate| self.first_where(|key| key.contains(candidate.as_str())))
    }

    fn first_where(&self, predicate: impl Fn(&str) -> bool) -> Option<&'a MunicipalityRef> {
        let municipalities = self.municipalities;
        self.keys
            .iter()
            .position(|key| !key.is_empty() && predicate(key))
            .map(|index| &municipalities[index])
    }
}

pub fn match_province<'a>(
    provinces: &'a [ProvinceRef],
    upstream_id: Option<&str>,
    candidates: &[String],
) -> Option<Matched<'a, ProvinceRef>> {
    let candidate_keys = candidate_keys(candidates, NameKind::Province);
    PROVINCE_PIPELINE.iter().find_map(|strategy| {
        let entry = match strategy {
            MatchStrategy::DirectId => {
                let id = upstream_id.map(str::trim).filter(|id| !id.is_empty())?;
                provinces.iter().find(|p| p.id == id)
            }
            _ => candidate_keys.iter().find_map(|candidate| {
                provinces
                    .iter()
                    .find(|p| &normalize(&p.name, NameKind::Province) == candidate)
            }),
        }?;
        Some(Matched {
            entry,
            strategy: *strategy,
        })
    })
}

fn candidate_keys(candidates: &[String], kind: NameKind) -> Vec<String> {
    candidates
        .iter()
        .map(|name| normalize(name, kind))
        .filter(|key| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    fn province(id: &str, name: &str) -> ProvinceRef {
        ProvinceRef {
            id: id.into(),
            name: name.into(),
            centroid: Coordinates::new(0.0, 0.0),
        }
    }

    fn municipality(id: &str, name: &str, province_id: &str) -> MunicipalityRef {
        MunicipalityRef {
            id: id.into(),
            name: name.into(),
            province_id: province_id.into(),
            centroid: None,
            category: None,
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn cordoba_municipalities() -> Vec<MunicipalityRef> {
        vec![
            municipality("140001", "Villa Hernando Sur", "14"),
            municipality("140002", "Hernando", "14"),
            municipality("140003", "Córdoba", "14"),
            municipality("140004", "San Roque", "14"),
        ]
    }

    #[test]
    fn exact_match_beats_containment() {
        let cordoba = province("14", "Córdoba");
        let list = cordoba_municipalities();
        let matcher = MunicipalityMatcher::new(&list, Some(&cordoba));

        let matched = matcher.resolve(None, &names(&["Hernando"])).unwrap();
        assert_eq!(matched.entry.id, "140002");
        assert_eq!(matched.strategy, MatchStrategy::ExactName);
    }

    #[test]
    fn direct_id_takes_priority() {
        let list = cordoba_municipalities();
        let matcher = MunicipalityMatcher::new(&list, None);

        let matched = matcher.resolve(Some("140004"), &names(&["Hernando"])).unwrap();
        assert_eq!(matched.entry.name, "San Roque");
        assert_eq!(matched.strategy, MatchStrategy::DirectId);
    }

    #[test]
    fn unknown_id_falls_through_to_names() {
        let list = cordoba_municipalities();
        let matcher = MunicipalityMatcher::new(&list, None);

        let matched = matcher.resolve(Some("999999"), &names(&["hernando"])).unwrap();
        assert_eq!(matched.entry.id, "140002");
        assert_eq!(matched.strategy, MatchStrategy::ExactName);
    }

    #[test]
    fn candidate_order_decides_between_exact_hits() {
        let list = cordoba_municipalities();
        let matcher = MunicipalityMatcher::new(&list, None);

        let matched = matcher
            .resolve(None, &names(&["Unknown Town", "San Roque", "Hernando"]))
            .unwrap();
        assert_eq!(matched.entry.name, "San Roque");
    }

    #[test]
    fn capital_heuristic_resolves_province_named_capital() {
        let santiago = province("86", "Santiago del Estero");
        let list = vec![
            municipality("860007", "La Banda", "86"),
            municipality("860014", "Capital", "86"),
        ];
        let matcher = MunicipalityMatcher::new(&list, Some(&santiago));

        for raw in ["Municipio de Santiago del Estero (Capital)", "Santiago del Estero"] {
            let matched = matcher.resolve(None, &names(&[raw])).unwrap();
            assert_eq!(matched.entry.id, "860014", "{raw}");
            assert_eq!(matched.strategy, MatchStrategy::CapitalHeuristic);
        }
    }

    #[test]
    fn capital_heuristic_accepts_ciudad_de_province() {
        let catamarca = province("10", "Catamarca");
        let list = vec![
            municipality("100001", "Valle Viejo", "10"),
            municipality("100002", "Ciudad de Catamarca", "10"),
        ];
        let matcher = MunicipalityMatcher::new(&list, Some(&catamarca));

        let matched = matcher.resolve(None, &names(&["Catamarca"])).unwrap();
        assert_eq!(matched.entry.id, "100002");
    }

    #[test]
    fn capital_heuristic_needs_province_named_candidate() {
        let santiago = province("86", "Santiago del Estero");
        let list = vec![municipality("860014", "Capital", "86")];
        let matcher = MunicipalityMatcher::new(&list, Some(&santiago));

        assert!(matcher.resolve(None, &names(&["La Banda"])).is_none());
    }

    #[test]
    fn capital_heuristic_skipped_without_province() {
        let list = vec![municipality("860014", "Capital", "86")];
        let matcher = MunicipalityMatcher::new(&list, None);

        assert!(matcher.resolve(None, &names(&["Santiago del Estero"])).is_none());
    }

    #[test]
    fn containment_is_last_resort_and_first_listed_wins() {
        let list = vec![
            municipality("1", "San Roque", "14"),
            municipality("2", "Roque Sáenz Peña", "22"),
        ];
        let matcher = MunicipalityMatcher::new(&list, None);

        let matched = matcher.resolve(None, &names(&["Roque"])).unwrap();
        assert_eq!(matched.entry.id, "1");
        assert_eq!(matched.strategy, MatchStrategy::Containment);
    }

    #[test]
    fn containment_matches_after_prefix_stripping() {
        let list = vec![municipality("1", "Villa San Roque Norte", "14")];
        let matcher = MunicipalityMatcher::new(&list, None);

        let matched = matcher.resolve(None, &names(&["Pedanía San Roque"])).unwrap();
        assert_eq!(matched.entry.id, "1");
        assert_eq!(matched.strategy, MatchStrategy::Containment);
    }

    #[test]
    fn blank_candidates_never_match() {
        let list = cordoba_municipalities();
        let matcher = MunicipalityMatcher::new(&list, None);

        assert!(matcher.resolve(None, &names(&["", "   ", "(capital)"])).is_none());
        assert!(matcher.resolve(Some(" "), &[]).is_none());
    }

    #[test]
    fn province_matches_by_id_then_name() {
        let provinces = vec![
            province("06", "Buenos Aires"),
            province("02", "Ciudad Autónoma de Buenos Aires"),
            province("14", "Córdoba"),
        ];

        let by_id = match_province(&provinces, Some("14"), &names(&["Buenos Aires"])).unwrap();
        assert_eq!(by_id.entry.name, "Córdoba");
        assert_eq!(by_id.strategy, MatchStrategy::DirectId);

        let by_name = match_province(&provinces, None, &names(&["Provincia de Córdoba"])).unwrap();
        assert_eq!(by_name.entry.id, "14");
        assert_eq!(by_name.strategy, MatchStrategy::ExactName);

        let caba = match_province(&provinces, None, &names(&["Ciudad Autónoma de Buenos Aires"]))
            .unwrap();
        assert_eq!(caba.entry.id, "02");
    }

    #[test]
    fn province_tier_has_no_containment() {
        let provinces = vec![province("06", "Buenos Aires")];
        assert!(match_province(&provinces, None, &names(&["Aires"])).is_none());
    }
}
