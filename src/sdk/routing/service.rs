use super::error::RoutingError;

/// What a single directions lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Encoded overview polyline of the first route.
    Found(String),
    /// The API answered but offered no route; `status` echoes the API's own status field.
    NotFound { status: Option<String> },
}

pub trait RouteFetcher {
    /// Looks up a driving route between two location descriptors.
    ///
    /// A non-success HTTP status is an error; an empty route list is `NotFound`.
    fn fetch(&self, pickup: &str, dropoff: &str) -> Result<FetchOutcome, RoutingError>;
}

impl<T: RouteFetcher + ?Sized> RouteFetcher for &T {
    fn fetch(&self, pickup: &str, dropoff: &str) -> Result<FetchOutcome, RoutingError> {
        (**self).fetch(pickup, dropoff)
    }
}
