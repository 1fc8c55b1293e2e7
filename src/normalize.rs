use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub const CABA_KEY: &str = "caba";

const CABA_FULL_NAME: &str = "ciudad autonoma de buenos aires";
const CAPITAL_FEDERAL: &str = "capital federal";

static PROVINCE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^provincia de\s+").expect("province prefix pattern"));

static CITY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:municipio de|partido de|departamento|pedania|ciudad de|localidad|barrio|comision municipal de)\s+",
    )
    .expect("city prefix pattern")
});

static CITY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\s*\(capital\)|\s+-\s*capital|\s+rural|\s+central|\s+y localidades|\s+eje vial)$")
        .expect("city suffix pattern")
});

static PARENTHETICAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)$").expect("parenthetical pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Province,
    City,
}

/// Qualifier stripping runs to a fixpoint, so `normalize(normalize(x, k), k)`
/// always equals `normalize(x, k)`.
pub fn normalize(raw: &str, kind: NameKind) -> String {
    let mut current = fold(raw);
    loop {
        let next = match kind {
            NameKind::Province => province_pass(&current),
            NameKind::City => city_pass(&current),
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

pub(crate) fn fold(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    collapse_whitespace(&stripped)
}

fn province_pass(value: &str) -> String {
    let cleaned = collapse_whitespace(&PROVINCE_PREFIX.replace(value, ""));
    if cleaned == CABA_FULL_NAME {
        return CABA_KEY.to_string();
    }
    cleaned
}

fn city_pass(value: &str) -> String {
    let cleaned = CITY_PREFIX.replace(value, "");
    let cleaned = CITY_SUFFIX.replace(&cleaned, "");
    let cleaned = PARENTHETICAL_SUFFIX.replace(&cleaned, "");
    let cleaned = collapse_whitespace(cleaned.trim_matches(|c: char| c == '-' || c.is_whitespace()));
    if cleaned == CAPITAL_FEDERAL || cleaned == CABA_FULL_NAME {
        return CABA_KEY.to_string();
    }
    cleaned
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
