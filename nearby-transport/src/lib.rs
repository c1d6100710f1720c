mod endpoints;
mod ors;
mod overpass;

pub use endpoints::{USER_AGENT, http_client};
pub use ors::{OrsClient, parse_directions, parse_geocode};
pub use overpass::OverpassClient;
