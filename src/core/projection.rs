//! Projection lookup for tiles without embedded coordinate system metadata.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

static ZONE_LABEL: OnceLock<Regex> = OnceLock::new();

fn zone_label() -> &'static Regex {
    ZONE_LABEL.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d{1,2})\s*(n|s|north|south)\s*$").expect("zone label pattern is valid")
    })
}

/// Errors that can occur while resolving a projection.
#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid UTM zone label: '{0}' (expected e.g. '10N' or '33S')")]
    InvalidZoneLabel(String),

    #[error("UTM zone {0} out of range 1-60")]
    ZoneOutOfRange(u32),
}

/// Resolves a zone label into a WKT projection string.
pub trait ProjectionResolver {
    fn lookup(&self, zone: &str) -> Result<String, ProjectionError>;
}

/// A parsed UTM zone such as `10N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub number: u32,
    pub north: bool,
}

impl UtmZone {
    /// Parses labels like `10N`, `10 north` or `33s`.
    pub fn parse(label: &str) -> Result<Self, ProjectionError> {
        let captures = zone_label()
            .captures(label)
            .ok_or_else(|| ProjectionError::InvalidZoneLabel(label.to_string()))?;

        let number: u32 = captures[1]
            .parse()
            .map_err(|_| ProjectionError::InvalidZoneLabel(label.to_string()))?;
        if !(1..=60).contains(&number) {
            return Err(ProjectionError::ZoneOutOfRange(number));
        }

        let north = captures[2].to_ascii_lowercase().starts_with('n');
        Ok(Self { number, north })
    }

    pub fn epsg(&self) -> u32 {
        if self.north {
            32600 + self.number
        } else {
            32700 + self.number
        }
    }

    pub fn central_meridian(&self) -> i32 {
        self.number as i32 * 6 - 183
    }

    /// WGS 84 / UTM projected coordinate system in OGC WKT.
    pub fn to_wkt(&self) -> String {
        let hemisphere = if self.north { 'N' } else { 'S' };
        let false_northing = if self.north { 0 } else { 10_000_000 };
        format!(
            concat!(
                "PROJCS[\"WGS 84 / UTM zone {zone}{hemi}\",",
                "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",",
                "SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],",
                "AUTHORITY[\"EPSG\",\"6326\"]],",
                "PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],",
                "UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],",
                "AUTHORITY[\"EPSG\",\"4326\"]],",
                "PROJECTION[\"Transverse_Mercator\"],",
                "PARAMETER[\"latitude_of_origin\",0],",
                "PARAMETER[\"central_meridian\",{cm}],",
                "PARAMETER[\"scale_factor\",0.9996],",
                "PARAMETER[\"false_easting\",500000],",
                "PARAMETER[\"false_northing\",{fn_}],",
                "UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],",
                "AXIS[\"Easting\",EAST],AXIS[\"Northing\",NORTH],",
                "AUTHORITY[\"EPSG\",\"{epsg}\"]]"
            ),
            zone = self.number,
            hemi = hemisphere,
            cm = self.central_meridian(),
            fn_ = false_northing,
            epsg = self.epsg(),
        )
    }
}

/// Built-in resolver for WGS 84 UTM zones.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtmResolver;

impl ProjectionResolver for UtmResolver {
    fn lookup(&self, zone: &str) -> Result<String, ProjectionError> {
        Ok(UtmZone::parse(zone)?.to_wkt())
    }
}
