use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::LocateError, location::Coordinate, prelude::*, query::PlaceQuery};

/// Name given to places the provider didn't name
pub const UNNAMED_PLACE: &str = "Unnamed Place";
/// Category given to places with neither an amenity nor a shop tag
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A point of interest, normalized from the provider's element
pub struct Place {
    pub id: String,
    pub name: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Place {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Distance in meters from `from` to this place
    pub fn distance_from(&self, from: &Coordinate) -> f64 {
        from.distance_to(&self.coordinate())
    }

    /// Closest places first
    pub fn sort_by_distance(places: &mut [Place], from: &Coordinate) {
        places.sort_by(|a, b| a.distance_from(from).total_cmp(&b.distance_from(from)));
    }

    /// Places whose category label matches `category`, ignoring case
    pub fn in_category<'a>(
        places: &'a [Place],
        category: &'a str,
    ) -> impl Iterator<Item = &'a Place> + 'a {
        places
            .iter()
            .filter(move |p| p.category.eq_ignore_ascii_case(category))
    }
}

/// Something that can run a geospatial query and hand back the raw response body
pub trait PlaceProvider: Send + Sync {
    fn query(&self, overpass_ql: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn coordinates(&self) -> Option<(f64, f64)> {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            return Some((lat, lon));
        }
        self.center.as_ref().map(|c| (c.lat, c.lon))
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `amenity` wins over `shop` when an element carries both
    fn category(&self) -> &str {
        self.tag("amenity")
            .or_else(|| self.tag("shop"))
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    fn into_place(self) -> Option<Place> {
        let Some((latitude, longitude)) = self.coordinates() else {
            debug!("Skipping element {} without coordinates", self.id);
            return None;
        };
        if !latitude.is_finite() || !longitude.is_finite() {
            debug!("Skipping element {} with non-finite coordinates", self.id);
            return None;
        }
        Some(Place {
            id: self.id.to_string(),
            name: self.tag("name").unwrap_or(UNNAMED_PLACE).to_string(),
            category: self.category().to_string(),
            latitude,
            longitude,
        })
    }
}

/// Parse an Overpass JSON body into places
pub fn parse_places(body: &str) -> Result<Vec<Place>, LocateError> {
    let response = serde_json::from_str::<OverpassResponse>(body)
        .map_err(|err| LocateError::ParseError(err.to_string()))?;
    Ok(response
        .elements
        .into_iter()
        .filter_map(OverpassElement::into_place)
        .collect())
}

/// Runs discovery cycles against a [PlaceProvider].
///
/// Holds no results between cycles, callers decide what to do with a failed one.
pub struct PlaceDiscoveryService<P: PlaceProvider> {
    provider: P,
    retry_on_failure: bool,
}

impl<P: PlaceProvider> PlaceDiscoveryService<P> {
    pub fn new(provider: P, retry_on_failure: bool) -> Self {
        Self {
            provider,
            retry_on_failure,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn fetch(&self, ql: &str) -> Result<String, LocateError> {
        match self.provider.query(ql).await {
            Ok(body) => Ok(body),
            Err(why) if self.retry_on_failure => {
                warn!("Place query failed, retrying once: {why:#}");
                self.provider
                    .query(ql)
                    .await
                    .map_err(|err| LocateError::NetworkError(LocateError::describe(&err)))
            }
            Err(why) => Err(LocateError::NetworkError(LocateError::describe(&why))),
        }
    }

    /// Run a single discovery cycle, an empty result is a success
    pub async fn discover(&self, query: &PlaceQuery) -> Result<Vec<Place>, LocateError> {
        let ql = query.to_overpass_ql();
        debug!("Running place query: {ql}");
        let body = self.fetch(&ql).await?;
        let places = parse_places(&body)?;
        info!(
            "Found {} places within {}m of ({}, {})",
            places.len(),
            query.radius_meters(),
            query.center().latitude,
            query.center().longitude
        );
        Ok(places)
    }
}
