//! Country → VAT region and country → standard VAT rate tables.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Uk,
    Ie,
    Eu,
    Sa,
    Row,
}

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Uk => "UK",
            Region::Ie => "IE",
            Region::Eu => "EU",
            Region::Sa => "SA",
            Region::Row => "ROW",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UK" => Ok(Region::Uk),
            "IE" => Ok(Region::Ie),
            "EU" => Ok(Region::Eu),
            "SA" => Ok(Region::Sa),
            "ROW" => Ok(Region::Row),
            other => Err(format!("unknown region '{}'", other)),
        }
    }
}

/// EU member states other than Ireland, which is its own region.
const EU_COUNTRIES: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IT", "LV",
    "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// Standard rates in basis points of 1 (2000 = 0.2000).
const STANDARD_RATES: &[(&str, i64)] = &[
    ("GB", 2000),
    ("IM", 2000),
    ("IE", 2300),
    ("ZA", 1500),
    ("AT", 2000),
    ("BE", 2100),
    ("BG", 2000),
    ("HR", 2500),
    ("CY", 1900),
    ("CZ", 2100),
    ("DK", 2500),
    ("EE", 2400),
    ("FI", 2550),
    ("FR", 2000),
    ("DE", 1900),
    ("GR", 2400),
    ("HU", 2700),
    ("IT", 2200),
    ("LV", 2100),
    ("LT", 2100),
    ("LU", 1700),
    ("MT", 1800),
    ("NL", 2100),
    ("PL", 2300),
    ("PT", 2300),
    ("RO", 2100),
    ("SK", 2300),
    ("SI", 2200),
    ("ES", 2100),
    ("SE", 2500),
];

fn normalize_country(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Total: every input maps to a region, unknown codes to `ROW`.
pub fn region_for_country(code: &str) -> Region {
    let code = normalize_country(code);
    match code.as_str() {
        "GB" | "UK" | "IM" => Region::Uk,
        "IE" => Region::Ie,
        "ZA" => Region::Sa,
        c if EU_COUNTRIES.contains(&c) => Region::Eu,
        _ => Region::Row,
    }
}

/// Standard VAT rate for a country at 4 dp; unknown countries get `0.0000`.
pub fn vat_rate_for_country(code: &str) -> Decimal {
    let code = match normalize_country(code).as_str() {
        "UK" => "GB".to_string(),
        other => other.to_string(),
    };
    let bp = STANDARD_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, bp)| *bp)
        .unwrap_or(0);
    numeric::round_rate(Decimal::new(bp, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions() {
        assert_eq!(region_for_country("GB"), Region::Uk);
        assert_eq!(region_for_country(" gb "), Region::Uk);
        assert_eq!(region_for_country("IE"), Region::Ie);
        assert_eq!(region_for_country("DE"), Region::Eu);
        assert_eq!(region_for_country("ZA"), Region::Sa);
        assert_eq!(region_for_country("US"), Region::Row);
        assert_eq!(region_for_country("XX"), Region::Row);
        assert_eq!(region_for_country(""), Region::Row);
    }

    #[test]
    fn rates() {
        assert_eq!(vat_rate_for_country("GB").to_string(), "0.2000");
        assert_eq!(vat_rate_for_country("UK").to_string(), "0.2000");
        assert_eq!(vat_rate_for_country("IE").to_string(), "0.2300");
        assert_eq!(vat_rate_for_country("ZA").to_string(), "0.1500");
        assert_eq!(vat_rate_for_country("FI").to_string(), "0.2550");
        assert_eq!(vat_rate_for_country("XX").to_string(), "0.0000");
    }

    #[test]
    fn every_rated_country_has_a_region_other_than_row() {
        for (code, _) in STANDARD_RATES {
            assert_ne!(region_for_country(code), Region::Row, "{}", code);
        }
    }

    #[test]
    fn region_round_trips_through_str() {
        for r in [Region::Uk, Region::Ie, Region::Eu, Region::Sa, Region::Row] {
            assert_eq!(r.as_str().parse::<Region>().unwrap(), r);
        }
    }
}
