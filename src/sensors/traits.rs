// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Motion source traits and sample types

use async_trait::async_trait;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Acceleration including gravity, in m/s²
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        self.as_vector().norm()
    }
}

/// A reading as delivered by the platform; any axis may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMotion {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
}

impl RawMotion {
    /// Returns the sample only when all three axes are present
    pub fn complete(&self) -> Option<MotionSample> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some(MotionSample { x, y, z }),
            _ => None,
        }
    }
}

impl From<MotionSample> for RawMotion {
    fn from(s: MotionSample) -> Self {
        Self {
            x: Some(s.x),
            y: Some(s.y),
            z: Some(s.z),
        }
    }
}

/// Outcome of a permission capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// The user granted access
    Granted,
    /// The user or platform refused access
    Denied,
    /// The platform grants motion access implicitly
    NotRequired,
}

impl Permission {
    pub fn allows_access(&self) -> bool {
        matches!(self, Permission::Granted | Permission::NotRequired)
    }
}

/// Trait for platform motion streams
#[async_trait]
pub trait MotionSource: Send + Sync {
    /// Source identifier used in logs
    fn id(&self) -> &str;

    /// Ask for motion access; may prompt the user on platforms that require it
    async fn request_permission(&self) -> Result<Permission>;

    /// Begin streaming readings; the stream ends when the receiver is dropped
    async fn subscribe(&self) -> Result<mpsc::Receiver<RawMotion>>;
}
