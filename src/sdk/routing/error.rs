use serde::Deserialize;
use thiserror::Error;

// Shape of the error fields the directions API puts in its JSON body
#[derive(Deserialize, Debug)]
pub struct DirectionsErrorPayload {
    pub status: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("API Error (HTTP {code}): {message}")]
    ApiError { code: u16, message: String },

    // Non-success status whose body carries no recognisable error message
    #[error("Unstructured API Error (HTTP {code}): {body}")]
    RawApiError { code: u16, body: String },

    #[error("Underlying request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid encoded polyline: {0}")]
    Polyline(String),
}
