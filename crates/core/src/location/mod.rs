//! Geolocation and nearby care-provider lookup.
//!
//! The HTTP transports live in the application crate; this module owns the
//! request/response formats and the fallback rules so they can be tested
//! without a network.

use serde::{Deserialize, Serialize};

use crate::{MindbeatError, Result};

/// Approximate position of the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(city: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            city: city.into(),
            latitude,
            longitude,
        }
    }

    /// Used whenever the geolocation service cannot be reached.
    pub fn fallback() -> Self {
        Self::new("New Delhi", 28.6139, 77.2090)
    }

    /// Decodes an ipinfo-style body: `city` plus `loc` as `"lat,lon"`.
    pub fn from_ipinfo_json(body: &str) -> Result<Self> {
        let response: IpInfoResponse = serde_json::from_str(body)?;
        let loc = response
            .loc
            .ok_or_else(|| MindbeatError::network("geolocation response has no `loc` field"))?;
        let (latitude, longitude) = parse_coordinates(&loc)?;

        Ok(Self {
            city: response.city.unwrap_or_else(|| "Unknown".to_string()),
            latitude,
            longitude,
        })
    }
}

#[derive(Deserialize)]
struct IpInfoResponse {
    city: Option<String>,
    loc: Option<String>,
}

fn parse_coordinates(pair: &str) -> Result<(f64, f64)> {
    let (lat, lon) = pair
        .split_once(',')
        .ok_or_else(|| MindbeatError::network(format!("malformed coordinates `{pair}`")))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| MindbeatError::network(format!("malformed coordinates `{pair}`")))
    };
    let (latitude, longitude) = (parse(lat)?, parse(lon)?);

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(MindbeatError::network(format!(
            "coordinates `{pair}` are out of range"
        )));
    }

    Ok((latitude, longitude))
}

/// One care provider near the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderListing {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub map_link: String,
}

impl ProviderListing {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            map_link: map_link(latitude, longitude),
        }
    }
}

pub fn map_link(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps?q={latitude},{longitude}")
}

/// Builds the Overpass QL query for hospitals, clinics, doctors and
/// therapists within `radius_m` meters of `center`.
pub fn overpass_query(center: &Location, radius_m: u32) -> String {
    const SELECTORS: [&str; 4] = [
        r#"node["amenity"="hospital"]"#,
        r#"node["amenity"="clinic"]"#,
        r#"node["healthcare"="doctor"]"#,
        r#"node["healthcare"="therapist"]"#,
    ];

    let around = format!(
        "(around:{radius_m},{},{})",
        center.latitude, center.longitude
    );
    let mut query = String::from("[out:json];\n(\n");
    for selector in SELECTORS {
        query.push_str("  ");
        query.push_str(selector);
        query.push_str(&around);
        query.push_str(";\n");
    }
    query.push_str(");\nout center;\n");
    query
}

/// Decodes an Overpass JSON response into listings in discovery order.
/// Elements without coordinates are skipped.
pub fn parse_overpass_json(body: &str) -> Result<Vec<ProviderListing>> {
    let response: OverpassResponse = serde_json::from_str(body)?;
    let listings = response
        .elements
        .into_iter()
        .filter_map(|element| {
            let (latitude, longitude) = match (element.lat, element.lon) {
                (Some(lat), Some(lon)) => (lat, lon),
                _ => match element.center {
                    Some(center) => (center.lat, center.lon),
                    None => return None,
                },
            };
            let name = element
                .tags
                .and_then(|tags| tags.name)
                .unwrap_or_else(|| "Unknown".to_string());
            Some(ProviderListing::new(name, latitude, longitude))
        })
        .collect();

    Ok(listings)
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    tags: Option<OverpassTags>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct OverpassTags {
    name: Option<String>,
}

/// Source of the user's approximate location.
pub trait Locator {
    fn locate(&mut self) -> Result<Location>;
}

/// Directory of care providers around a point.
pub trait ProviderDirectory {
    fn nearby(&mut self, center: &Location, radius_m: u32) -> Result<Vec<ProviderListing>>;
}

/// Asks `locator` for a fresh position, substituting `fallback` on failure.
pub fn locate_or_fallback<L: Locator + ?Sized>(locator: &mut L, fallback: &Location) -> Location {
    match locator.locate() {
        Ok(location) => location,
        Err(err) => {
            tracing::warn!(error = %err, city = %fallback.city, "could not fetch location, using fallback");
            fallback.clone()
        }
    }
}
