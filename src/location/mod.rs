// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Device location lookup with a bounded wait

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LocationConfig;
use crate::error::{CrashDocError, Result};

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.latitude >= 0.0 { 'N' } else { 'S' };
        let ew = if self.longitude >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.4}° {}, {:.4}° {}",
            self.latitude.abs(),
            ns,
            self.longitude.abs(),
            ew
        )
    }
}

/// Human-readable form of an optional fix
pub fn describe(location: Option<&Location>) -> String {
    match location {
        Some(l) => l.to_string(),
        None => "location unknown".to_string(),
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current(&self) -> Result<Location>;
}

/// Reports a configured position
pub struct FixedLocation {
    location: Location,
}

impl FixedLocation {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current(&self) -> Result<Location> {
        Ok(self.location)
    }
}

/// No positioning available
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current(&self) -> Result<Location> {
        Err(CrashDocError::LocationUnavailable("no provider configured".to_string()))
    }
}

/// Build the provider described by the configuration
pub fn from_config(config: &LocationConfig) -> Box<dyn LocationProvider> {
    match (config.latitude, config.longitude) {
        (Some(lat), Some(lon)) => Box::new(FixedLocation::new(Location::new(lat, lon))),
        _ => Box::new(NoLocation),
    }
}

/// Query the provider, giving up after `timeout`. Failures yield `None`.
pub async fn locate(provider: &dyn LocationProvider, timeout: Duration) -> Option<Location> {
    match tokio::time::timeout(timeout, provider.current()).await {
        Ok(Ok(location)) => {
            debug!("Location fix: {}", location);
            Some(location)
        }
        Ok(Err(e)) => {
            info!("Location not available: {}", e);
            None
        }
        Err(_) => {
            info!("Location lookup timed out after {:?}", timeout);
            None
        }
    }
}
