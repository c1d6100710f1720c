use anyhow::{anyhow, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use nearby_logic::{
    Coordinate, DirectionsProvider, GeocodeProvider, GeocodeResult, RouteGeometry, prelude::*,
};

use crate::endpoints::{ORS_GEOCODE_URL, ORS_KEY_VAR, ORS_PROFILE, directions_url, http_client};

/// OpenRouteService, used both for directions and geocoding
#[derive(Clone)]
pub struct OrsClient {
    client: reqwest::Client,
    api_key: String,
    profile: String,
}

impl OrsClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            profile: ORS_PROFILE.to_string(),
        }
    }

    /// Routing profile such as `foot-walking` or `cycling-regular`
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Build a client with the key from `ORS_API_KEY`
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ORS_KEY_VAR)
            .with_context(|| format!("{ORS_KEY_VAR} is not set"))?;
        Ok(Self::new(http_client()?, key))
    }
}

#[derive(Serialize)]
struct DirectionsBody {
    /// `[lon, lat]` pairs
    coordinates: [[f64; 2]; 2],
}

#[derive(Deserialize)]
struct FeatureCollection<P> {
    features: Vec<Feature<P>>,
}

#[derive(Deserialize)]
struct Feature<P> {
    geometry: Geometry,
    properties: Option<P>,
}

#[derive(Deserialize)]
struct Geometry {
    coordinates: serde_json::Value,
}

#[derive(Deserialize)]
struct GeocodeProperties {
    label: Option<String>,
}

fn lon_lat(value: &serde_json::Value) -> Option<Coordinate> {
    let pair = value.as_array()?;
    match pair.as_slice() {
        [lon, lat, ..] => Some(Coordinate::new(lat.as_f64()?, lon.as_f64()?)),
        _ => None,
    }
}

/// Pull the route out of an ORS GeoJSON directions response
pub fn parse_directions(body: &str) -> Result<RouteGeometry> {
    let collection = serde_json::from_str::<FeatureCollection<serde_json::Value>>(body)
        .context("Directions response is not a feature collection")?;
    let feature = collection
        .features
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Directions response has no route"))?;
    let coordinates = feature
        .geometry
        .coordinates
        .as_array()
        .ok_or_else(|| anyhow!("Route geometry is not a line"))?
        .iter()
        .map(|point| lon_lat(point).ok_or_else(|| anyhow!("Malformed route point {point}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(RouteGeometry::new(coordinates))
}

/// Read every point match from an ORS geocode response
pub fn parse_geocode(body: &str) -> Result<Vec<GeocodeResult>> {
    let collection = serde_json::from_str::<FeatureCollection<GeocodeProperties>>(body)
        .context("Geocode response is not a feature collection")?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let coordinate = lon_lat(&feature.geometry.coordinates)?;
            Some(GeocodeResult {
                latitude: coordinate.latitude,
                longitude: coordinate.longitude,
                label: feature.properties.and_then(|p| p.label),
            })
        })
        .collect())
}

impl DirectionsProvider for OrsClient {
    async fn directions(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteGeometry> {
        if self.api_key.is_empty() {
            bail!("No OpenRouteService key configured");
        }
        let body = DirectionsBody {
            coordinates: [
                [origin.longitude, origin.latitude],
                [destination.longitude, destination.latitude],
            ],
        };
        let url = directions_url(&self.profile);
        debug!("Requesting {} route", self.profile);
        let text = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Could not send directions request")?
            .error_for_status()
            .context("Directions service returned error")?
            .text()
            .await
            .context("Failed to read directions response")?;
        parse_directions(&text)
    }
}

impl GeocodeProvider for OrsClient {
    async fn search(&self, text: &str) -> Result<Vec<GeocodeResult>> {
        if self.api_key.is_empty() {
            bail!("No OpenRouteService key configured");
        }
        let body = self
            .client
            .get(ORS_GEOCODE_URL)
            .query(&[("api_key", self.api_key.as_str()), ("text", text)])
            .send()
            .await
            .context("Could not send geocode request")?
            .error_for_status()
            .context("Geocoding service returned error")?
            .text()
            .await
            .context("Failed to read geocode response")?;
        parse_geocode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directions() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"summary": {"distance": 1234.5, "duration": 300.0}},
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[-122.4324, 37.78825], [-122.4330, 37.7890], [-122.4335, 37.7895, 12.0]]
                }
            }]
        }"#;
        let route = parse_directions(body).unwrap();
        assert_eq!(route.points.len(), 3);
        assert_eq!(route.points[0], Coordinate::new(37.78825, -122.4324));
        assert_eq!(route.points[2], Coordinate::new(37.7895, -122.4335));
    }

    #[test]
    fn test_directions_without_route() {
        let empty = r#"{"type": "FeatureCollection", "features": []}"#;
        let err = parse_directions(empty).unwrap_err();
        assert!(err.to_string().contains("no route"));
        assert!(parse_directions("{}").is_err());
        let bad_point = r#"{"features": [{"geometry": {"coordinates": [[1.0]]}}]}"#;
        assert!(parse_directions(bad_point).is_err());
    }

    #[test]
    fn test_parse_geocode() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"geometry": {"type": "Point", "coordinates": [2.3522, 48.8566]},
                 "properties": {"label": "Paris, France", "country": "France"}},
                {"geometry": {"type": "Point", "coordinates": [-95.5555, 33.6609]},
                 "properties": {}},
                {"geometry": {"type": "Point", "coordinates": []}}
            ]
        }"#;
        let results = parse_geocode(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label.as_deref(), Some("Paris, France"));
        assert_eq!(results[0].coordinate(), Coordinate::new(48.8566, 2.3522));
        assert_eq!(results[1].label, None);
    }

    #[test]
    fn test_geocode_no_features() {
        assert_eq!(parse_geocode(r#"{"features": []}"#).unwrap(), vec![]);
        assert!(parse_geocode("<html>").is_err());
    }

    #[test]
    fn test_directions_body_is_lon_lat() {
        let body = DirectionsBody {
            coordinates: [[-122.4, 37.7], [-122.5, 37.8]],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"coordinates":[[-122.4,37.7],[-122.5,37.8]]}"#
        );
    }
}
