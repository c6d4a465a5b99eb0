pub mod remote;
pub mod types;

pub use remote::{interpret_response, GoogleDirectionsProvider};
