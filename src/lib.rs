pub mod sdk;

pub use sdk::config::{DirectionsConfig, PipelineConfig, PointFilter};
pub use sdk::error::{Error, Result};
pub use sdk::persist::{merge_directory, merge_geometry_files, write_geometry, write_table, RouteResult};
pub use sdk::pipeline::{partition, Pipeline, RunSummary};
pub use sdk::routing::{FetchOutcome, GoogleDirectionsProvider, RouteFetcher};
pub use sdk::trips::{load, write_sample_batches, LoadOptions, Location, TripRecord, TripSet};
