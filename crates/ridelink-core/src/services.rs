//! Outer collaborators of a ride: where finished records go and where the
//! rider is when a ride ends.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::RidelinkError;
use crate::ride::RideRecord;
use crate::types::{Coordinate, UserIdentity};

/// Destination of finished ride records
#[async_trait]
pub trait RideSink: Send + Sync {
    async fn submit(&self, record: RideRecord, user: UserIdentity) -> Result<(), RidelinkError>;
}

/// Source of the rider's location at ride end
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Current coordinate, `None` when unavailable
    async fn snapshot(&self) -> Option<Coordinate>;
}

/// Location provider that never knows where the rider is
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn snapshot(&self) -> Option<Coordinate> {
        None
    }
}

/// Location provider pinned to one coordinate
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinate);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn snapshot(&self) -> Option<Coordinate> {
        Some(self.0)
    }
}

/// Ride sink that keeps submitted records in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRideSink {
    records: Arc<Mutex<Vec<(RideRecord, UserIdentity)>>>,
}

impl MemoryRideSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<(RideRecord, UserIdentity)> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RideSink for MemoryRideSink {
    async fn submit(&self, record: RideRecord, user: UserIdentity) -> Result<(), RidelinkError> {
        self.records.lock().await.push((record, user));
        Ok(())
    }
}
