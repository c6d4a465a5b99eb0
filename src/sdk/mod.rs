pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod routing;
pub mod trips;
pub mod util;
