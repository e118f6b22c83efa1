//! File-backed outer services for the session runtime
//!
//! The catalog is read from `catalog.<env>.json` in a directory and finished
//! rides are written as one JSON document per ride.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use ridelink_core::{
    Catalog, CatalogError, CatalogService, Environment, FixedLocation, LocationProvider,
    NoLocation, RideRecord, RideSink, RidelinkError, UserIdentity,
};

use crate::config::LocationConfig;

// ----------------------------------------------------------------------------
// Catalog
// ----------------------------------------------------------------------------

/// Catalog service reading published catalog files from a directory
#[derive(Debug, Clone)]
pub struct FileCatalogService {
    dir: PathBuf,
}

impl FileCatalogService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, environment: Environment) -> PathBuf {
        self.dir.join(format!("catalog.{}.json", environment.as_str()))
    }
}

#[async_trait]
impl CatalogService for FileCatalogService {
    async fn fetch_catalog(&self, environment: Environment) -> Result<Catalog, CatalogError> {
        let path = self.path_for(environment);
        debug!(path = %path.display(), "Reading firmware catalog");
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CatalogError::Unavailable {
                reason: format!("{}: {}", path.display(), e),
            })?;
        Catalog::from_json(&json)
    }
}

// ----------------------------------------------------------------------------
// Ride Sink
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct StoredRide<'a> {
    user: &'a UserIdentity,
    record: &'a RideRecord,
}

/// Ride sink writing `<ride id>.json` into a directory
#[derive(Debug, Clone)]
pub struct JsonRideSink {
    dir: PathBuf,
}

impl JsonRideSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ride: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", ride))
    }
}

#[async_trait]
impl RideSink for JsonRideSink {
    async fn submit(&self, record: RideRecord, user: UserIdentity) -> Result<(), RidelinkError> {
        let sink_error = |e: &dyn std::fmt::Display| RidelinkError::Sink {
            reason: e.to_string(),
        };

        let json = serde_json::to_vec_pretty(&StoredRide {
            user: &user,
            record: &record,
        })
        .map_err(|e| sink_error(&e))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| sink_error(&e))?;
        let path = self.path_for(record.id);
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| sink_error(&e))?;

        info!(ride = %record.id, path = %path.display(), "Ride record stored");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Location
// ----------------------------------------------------------------------------

/// Location provider for the configured coordinate, if any
pub fn location_provider(config: &LocationConfig) -> Arc<dyn LocationProvider> {
    match config.coordinate() {
        Some(coordinate) => Arc::new(FixedLocation(coordinate)),
        None => Arc::new(NoLocation),
    }
}
