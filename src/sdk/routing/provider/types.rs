use serde::Deserialize;

// --- Data Structures for parsing directions responses ---

#[derive(Deserialize, Debug)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<Route>,
    pub status: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Route {
    pub overview_polyline: OverviewPolyline,
}

#[derive(Deserialize, Debug)]
pub struct OverviewPolyline {
    pub points: String,
}
