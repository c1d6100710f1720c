use std::time::Duration;

use nearby_logic::prelude::*;

const fn overpass_url() -> &'static str {
    if let Some(url) = option_env!("NEARBY_OVERPASS_URL") {
        url
    } else {
        "https://overpass-api.de/api/interpreter"
    }
}

const fn ors_url() -> &'static str {
    if let Some(url) = option_env!("NEARBY_ORS_URL") {
        url
    } else {
        "https://api.openrouteservice.org"
    }
}

const fn ors_profile() -> &'static str {
    if let Some(profile) = option_env!("NEARBY_ORS_PROFILE") {
        profile
    } else {
        "driving-car"
    }
}

const fn http_timeout_secs() -> u64 {
    if let Some(secs) = option_env!("NEARBY_HTTP_TIMEOUT_SECS") {
        const_str::parse!(secs, u64)
    } else {
        30
    }
}

pub const OVERPASS_URL: &str = overpass_url();
pub const ORS_URL: &str = ors_url();
pub const ORS_PROFILE: &str = ors_profile();
const HTTP_TIMEOUT: Duration = Duration::from_secs(http_timeout_secs());

pub const ORS_GEOCODE_URL: &str = const_str::concat!(ORS_URL, "/geocode/search");
const ORS_DIRECTIONS_URL: &str = const_str::concat!(ORS_URL, "/v2/directions");

/// Environment variable holding the OpenRouteService key
pub const ORS_KEY_VAR: &str = "ORS_API_KEY";

pub const USER_AGENT: &str =
    const_str::concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub fn directions_url(profile: &str) -> String {
    format!("{ORS_DIRECTIONS_URL}/{profile}/geojson")
}

/// Client shared by every provider, carries our user agent and request timeout
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}
