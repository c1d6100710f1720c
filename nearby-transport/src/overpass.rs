use log::debug;

use nearby_logic::{PlaceProvider, prelude::*};

use crate::endpoints::{OVERPASS_URL, http_client};

/// Runs Overpass QL against an Overpass API interpreter
#[derive(Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
}

impl OverpassClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Client pointed at the interpreter chosen at build time
    pub fn from_build_env() -> Result<Self> {
        Ok(Self::new(http_client()?, OVERPASS_URL))
    }
}

impl PlaceProvider for OverpassClient {
    async fn query(&self, overpass_ql: &str) -> Result<String> {
        debug!("Querying {}", self.url);
        self.client
            .get(&self.url)
            .query(&[("data", overpass_ql)])
            .send()
            .await
            .context("Could not send request to Overpass")?
            .error_for_status()
            .context("Overpass returned error")?
            .text()
            .await
            .context("Failed to read Overpass response")
    }
}
