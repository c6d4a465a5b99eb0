pub mod error;
pub mod polyline;
pub mod provider;
pub mod service;

pub use error::RoutingError;
pub use polyline::{decode_lon_lat, encode_lon_lat, LonLat};
pub use provider::GoogleDirectionsProvider;
pub use service::{FetchOutcome, RouteFetcher};
