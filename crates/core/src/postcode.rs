//! UK postcode grammar.
//!
//! A unit postcode is four nested geographic levels:
//!
//! | Level    | Shape                                  | Example    |
//! |----------|----------------------------------------|------------|
//! | Area     | 1-2 letters                            | `SW`       |
//! | District | area + 1 digit + optional letter/digit | `SW1A`     |
//! | Sector   | district + 1 digit                     | `SW1A 1`   |
//! | Unit     | sector + 2 letters                     | `SW1A 1AA` |
//!
//! The outcode is the district; the incode is the sector digit plus the unit
//! letters. Some districts and sectors collide once the space is dropped
//! (`E17` vs `E1 7`), which does not matter for full unit postcodes.
//!
//! Parsing never fails. Real-world bulk data contains plenty of malformed
//! postcodes, so an unmatched input yields a [`Postcode`] whose accessors all
//! return `None`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Whitespace is allowed between outcode and incode only.
static POSTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][A-Z]?)([0-9][A-Z0-9]?)\s*([0-9])([A-Z]{2})$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Segments {
    area: String,
    district: String,
    sector: String,
    unit: String,
}

/// A raw postcode string plus its hierarchy, if the grammar matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Postcode {
    raw: String,
    segments: Option<Segments>,
}

impl Postcode {
    /// Parse a raw string. Case-insensitive; input is uppercased before matching.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        let segments = POSTCODE_RE.captures(&upper).map(|caps| Segments {
            area: caps[1].to_string(),
            district: caps[2].to_string(),
            sector: caps[3].to_string(),
            unit: caps[4].to_string(),
        });
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.segments.is_some()
    }

    /// e.g. `SW`
    pub fn postcode_area(&self) -> Option<String> {
        self.segments.as_ref().map(|s| s.area.clone())
    }

    /// e.g. `SW1A`
    pub fn postcode_district(&self) -> Option<String> {
        self.segments
            .as_ref()
            .map(|s| format!("{}{}", s.area, s.district))
    }

    /// e.g. `SW1A 1` with `separator = " "`
    pub fn postcode_sector(&self, separator: &str) -> Option<String> {
        self.segments
            .as_ref()
            .map(|s| format!("{}{}{separator}{}", s.area, s.district, s.sector))
    }

    /// e.g. `SW1A 1AA` with `separator = " "`, `SW1A1AA` with `""`.
    pub fn unit_postcode(&self, separator: &str) -> Option<String> {
        self.segments.as_ref().map(|s| {
            format!("{}{}{separator}{}{}", s.area, s.district, s.sector, s.unit)
        })
    }

    pub fn outcode(&self) -> Option<String> {
        self.postcode_district()
    }

    pub fn incode(&self) -> Option<String> {
        self.segments
            .as_ref()
            .map(|s| format!("{}{}", s.sector, s.unit))
    }

    /// Canonical storage and lookup key: the unit postcode with no separator.
    pub fn key(&self) -> Option<String> {
        self.unit_postcode("")
    }

    /// All levels at once, for display and JSON output.
    pub fn parts(&self) -> Option<PostcodeParts> {
        self.segments.as_ref()?;
        Some(PostcodeParts {
            key: self.key()?,
            unit: self.unit_postcode(" ")?,
            area: self.postcode_area()?,
            district: self.postcode_district()?,
            sector: self.postcode_sector(" ")?,
            outcode: self.outcode()?,
            incode: self.incode()?,
        })
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit_postcode(" ") {
            Some(unit) => write!(f, "{unit}"),
            None => write!(f, "invalid"),
        }
    }
}

/// Flattened hierarchy of a valid postcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostcodeParts {
    pub key: String,
    pub unit: String,
    pub area: String,
    pub district: String,
    pub sector: String,
    pub outcode: String,
    pub incode: String,
}
