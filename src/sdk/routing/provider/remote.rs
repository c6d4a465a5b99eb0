use super::types::DirectionsResponse;
use crate::sdk::config::DirectionsConfig;
use crate::sdk::routing::error::{DirectionsErrorPayload, RoutingError};
use crate::sdk::routing::service::{FetchOutcome, RouteFetcher};
use crate::sdk::util::rate_limit::{self, Limiter};
use reqwest::blocking::Client;
use reqwest::StatusCode;

pub struct GoogleDirectionsProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    limiter: Option<Limiter>,
}

impl GoogleDirectionsProvider {
    pub fn new(config: &DirectionsConfig) -> Result<Self, RoutingError> {
        Ok(Self {
            client: Client::builder().timeout(config.timeout).build()?,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            limiter: config.requests_per_minute.map(rate_limit::per_minute_limiter),
        })
    }
}

impl RouteFetcher for GoogleDirectionsProvider {
    fn fetch(&self, pickup: &str, dropoff: &str) -> Result<FetchOutcome, RoutingError> {
        if let Some(limiter) = &self.limiter {
            rate_limit::wait(limiter);
        }
        log::debug!(
            "[PROVIDER] Calling directions for \"{}\" -> \"{}\"",
            pickup,
            dropoff
        );

        let response = match self
            .client
            .get(&self.endpoint)
            .query(&[
                ("origin", pickup),
                ("destination", dropoff),
                ("mode", "driving"),
                ("key", self.api_key.as_str()),
            ])
            .send()
        {
            Ok(resp) => resp,
            Err(e) => {
                log::error!(
                    "Failed to send GET request. URL: {}\nError: {}",
                    self.endpoint,
                    e
                );
                return Err(RoutingError::RequestError(e));
            }
        };

        let status = response.status();
        let text = response.text()?;
        interpret_response(status, &text)
    }
}

/// Turns a raw directions response into a fetch outcome.
pub fn interpret_response(status: StatusCode, text: &str) -> Result<FetchOutcome, RoutingError> {
    if !status.is_success() {
        // Try to parse the structured error first
        if let Ok(DirectionsErrorPayload {
            error_message: Some(message),
            ..
        }) = serde_json::from_str::<DirectionsErrorPayload>(text)
        {
            return Err(RoutingError::ApiError {
                code: status.as_u16(),
                message,
            });
        }
        log::error!(
            "API returned non-success status: {}. Unparseable Body: {}",
            status,
            text
        );
        return Err(RoutingError::RawApiError {
            code: status.as_u16(),
            body: text.to_string(),
        });
    }

    let directions: DirectionsResponse = serde_json::from_str(text).map_err(|e| {
        log::error!("Failed to parse DirectionsResponse. Error: {}. Body: {}", e, text);
        e
    })?;

    match directions.routes.into_iter().next() {
        Some(route) => Ok(FetchOutcome::Found(route.overview_polyline.points)),
        None => {
            if let Some(message) = &directions.error_message {
                log::warn!("Directions API returned no routes: {}", message);
            }
            Ok(FetchOutcome::NotFound {
                status: directions.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_route_wins() {
        let body = r#"{
            "status": "OK",
            "routes": [
                {"overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC"}},
                {"overview_polyline": {"points": "ignored"}}
            ]
        }"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert_eq!(outcome, FetchOutcome::Found("_p~iF~ps|U_ulLnnqC".to_string()));
    }

    #[test]
    fn test_empty_routes_is_not_found() {
        let body = r#"{"status": "ZERO_RESULTS", "routes": []}"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::NotFound {
                status: Some("ZERO_RESULTS".to_string())
            }
        );
    }

    #[test]
    fn test_missing_routes_is_not_found() {
        let body = r#"{"status": "NOT_FOUND"}"#;
        let outcome = interpret_response(StatusCode::OK, body).unwrap();
        assert!(matches!(outcome, FetchOutcome::NotFound { .. }));
    }

    #[test]
    fn test_error_status_with_message() {
        let body = r#"{"error_message": "The provided API key is invalid.", "routes": [], "status": "REQUEST_DENIED"}"#;
        let err = interpret_response(StatusCode::FORBIDDEN, body).unwrap_err();
        match err {
            RoutingError::ApiError { code, message } => {
                assert_eq!(code, 403);
                assert_eq!(message, "The provided API key is invalid.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_status_raw_body() {
        let err = interpret_response(StatusCode::TOO_MANY_REQUESTS, "slow down").unwrap_err();
        assert!(matches!(err, RoutingError::RawApiError { code: 429, .. }));
    }

    #[test]
    fn test_malformed_success_body() {
        let err = interpret_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, RoutingError::ParseError(_)));
    }

    #[test]
    fn test_new_uses_config() {
        let mut config = DirectionsConfig::new("key");
        config.requests_per_minute = std::num::NonZeroU32::new(10);
        let provider = GoogleDirectionsProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, crate::sdk::config::DEFAULT_ENDPOINT);
        assert!(provider.limiter.is_some());
    }
}
