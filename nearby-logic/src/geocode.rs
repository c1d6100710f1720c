use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{error::LocateError, location::Coordinate, prelude::*};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One match for a free-text search
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    /// Human readable name of the match, if the provider gave one
    pub label: Option<String>,
}

impl GeocodeResult {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Resolves free text into zero or more coordinates
pub trait GeocodeProvider: Send + Sync {
    fn search(&self, text: &str) -> impl Future<Output = Result<Vec<GeocodeResult>>> + Send;
}

pub struct GeocodeResolver<G: GeocodeProvider> {
    provider: G,
}

impl<G: GeocodeProvider> GeocodeResolver<G> {
    pub fn new(provider: G) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &G {
        &self.provider
    }

    /// Look up `text`, zero matches is a success
    pub async fn resolve(&self, text: &str) -> Result<Vec<GeocodeResult>, LocateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LocateError::invalid("Search text is empty"));
        }

        let results = self
            .provider
            .search(text)
            .await
            .map_err(|err| LocateError::GeocodeError(LocateError::describe(&err)))?;

        let before = results.len();
        let results = results
            .into_iter()
            .filter(|r| r.coordinate().is_valid())
            .collect::<Vec<_>>();
        if results.len() != before {
            warn!(
                "Dropped {} geocode results with invalid coordinates",
                before - results.len()
            );
        }

        debug!("Geocoding \"{text}\" gave {} results", results.len());
        Ok(results)
    }

    /// Look up `text` and keep only the first match
    pub async fn resolve_first(&self, text: &str) -> Result<Option<GeocodeResult>, LocateError> {
        Ok(self.resolve(text).await?.into_iter().next())
    }
}
