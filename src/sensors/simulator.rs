// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Accelerometer simulator for demo/testing

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use rand::prelude::*;
use rand_distr::Normal;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{MotionSample, MotionSource, Permission, RawMotion};
use crate::error::{CrashDocError, Result};

const GRAVITY: f64 = 9.81;

/// Simulates a phone resting in a moving car, with occasional impacts
pub struct SimulatedMotionSource {
    id: String,
    sample_rate: f64,
    noise_std: f64,
    impact_probability: f64,
    permission: Permission,
    seed: Option<u64>,
    pending_impacts: Arc<AtomicU32>,
}

impl SimulatedMotionSource {
    pub fn new(id: &str, sample_rate: f64) -> Self {
        Self {
            id: id.to_string(),
            sample_rate,
            noise_std: 0.3,
            impact_probability: 0.0,
            permission: Permission::NotRequired,
            seed: None,
            pending_impacts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Chance per sample of a spontaneous impact
    pub fn with_impact_probability(mut self, probability: f64) -> Self {
        self.impact_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    /// Answer permission queries with a fixed result
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Queue an impact on the next generated sample
    pub fn inject_impact(&self) {
        self.pending_impacts.fetch_add(1, Ordering::SeqCst);
    }
}

struct Generator {
    rng: StdRng,
    noise: Normal<f64>,
    impact_probability: f64,
    pending_impacts: Arc<AtomicU32>,
}

impl Generator {
    fn next_sample(&mut self) -> MotionSample {
        let mut sample = MotionSample::new(
            self.rng.sample(self.noise),
            self.rng.sample(self.noise),
            GRAVITY + self.rng.sample(self.noise),
        );

        let queued = self
            .pending_impacts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if queued || self.rng.gen::<f64>() < self.impact_probability {
            // Frontal deceleration spike
            let force = self.rng.gen_range(35.0..70.0);
            sample.x -= force;
            sample.y += self.rng.gen_range(-5.0..5.0);
            debug!("Simulated impact of {:.1} m/s²", force);
        }

        sample
    }
}

#[async_trait]
impl MotionSource for SimulatedMotionSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn request_permission(&self) -> Result<Permission> {
        Ok(self.permission)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<RawMotion>> {
        let noise = Normal::new(0.0, self.noise_std)
            .map_err(|e| CrashDocError::Sensor(format!("invalid noise level: {}", e)))?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut generator = Generator {
            rng,
            noise,
            impact_probability: self.impact_probability,
            pending_impacts: self.pending_impacts.clone(),
        };

        let period = Duration::from_secs_f64(1.0 / self.sample_rate.max(1.0));
        let (tx, rx) = mpsc::channel(256);
        let id = self.id.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.send(generator.next_sample().into()).await.is_err() {
                    break;
                }
            }
            debug!("Simulator {} stream closed", id);
        });

        info!("Simulated accelerometer {} streaming at {} Hz", self.id, self.sample_rate);
        Ok(rx)
    }
}
