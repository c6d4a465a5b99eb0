use thiserror::Error;

use super::config::ConfigError;
use super::persist::PersistError;
use super::routing::error::RoutingError;
use super::trips::LoadError;

/// Everything that can stop a run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data load error: {0}")]
    DataLoad(#[from] LoadError),

    #[error("Directions API error: {0}")]
    Api(#[from] RoutingError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, Error>;
