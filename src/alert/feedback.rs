// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Siren and haptic alarm outputs
//!
//! Alarm feedback is held through a [`FeedbackGuard`]. Creating the guard
//! starts the outputs, dropping it stops them, so every exit from the
//! countdown releases the siren without an explicit call.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::AlertConfig;
use crate::error::Result;

/// Audible alarm
pub trait Siren: Send + Sync {
    /// Begin the tone
    fn start(&self) -> Result<()>;

    /// Restart the downward sweep from the high pitch
    fn retrigger(&self) -> Result<()>;

    fn stop(&self);
}

/// Vibration motor
pub trait Haptics: Send + Sync {
    /// Play an on/off pattern in milliseconds
    fn vibrate(&self, pattern: &[u64]) -> Result<()>;
}

/// Siren for hosts without audio output
pub struct LogSiren;

impl Siren for LogSiren {
    fn start(&self) -> Result<()> {
        debug!("🚨 Siren on");
        Ok(())
    }

    fn retrigger(&self) -> Result<()> {
        debug!("🚨 Siren sweep");
        Ok(())
    }

    fn stop(&self) {
        debug!("Siren off");
    }
}

/// Haptics for hosts without a vibration motor
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn vibrate(&self, pattern: &[u64]) -> Result<()> {
        debug!("📳 Vibrate {:?}", pattern);
        Ok(())
    }
}

/// The alarm outputs available to the controller
#[derive(Clone)]
pub struct FeedbackOutputs {
    siren: Option<Arc<dyn Siren>>,
    haptics: Option<Arc<dyn Haptics>>,
}

impl FeedbackOutputs {
    pub fn new(siren: Option<Arc<dyn Siren>>, haptics: Option<Arc<dyn Haptics>>) -> Self {
        Self { siren, haptics }
    }

    pub fn logging() -> Self {
        Self::new(Some(Arc::new(LogSiren)), Some(Arc::new(LogHaptics)))
    }

    pub fn silent() -> Self {
        Self::new(None, None)
    }

    /// One-shot vibration; failures are logged and ignored
    pub fn vibrate(&self, pattern: &[u64]) {
        if let Some(haptics) = &self.haptics {
            if let Err(e) = haptics.vibrate(pattern) {
                warn!("Vibration failed: {}", e);
            }
        }
    }
}

enum Pulse {
    Siren,
    Haptic,
}

/// Scoped alarm: outputs run while the guard lives
pub struct FeedbackGuard {
    outputs: FeedbackOutputs,
    siren_running: bool,
    siren_timer: Option<Interval>,
    haptic_timer: Option<Interval>,
    pattern: Vec<u64>,
}

impl FeedbackGuard {
    /// Crash alarm: siren retriggered every siren period, haptic pattern
    /// every haptic period. A siren that fails to start is skipped.
    pub fn alarm(outputs: FeedbackOutputs, config: &AlertConfig) -> Self {
        let siren_running = match &outputs.siren {
            Some(siren) => match siren.start() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Audio alarm unavailable: {}", e);
                    false
                }
            },
            None => false,
        };

        let siren_timer = siren_running.then(|| repeating(config.siren_period(), false));
        let haptic_timer = outputs
            .haptics
            .is_some()
            .then(|| repeating(config.haptic_period(), false));

        Self {
            outputs,
            siren_running,
            siren_timer,
            haptic_timer,
            pattern: config.alarm_pattern_ms.clone(),
        }
    }

    /// Manual SOS countdown: a short pulse every second, no siren
    pub fn ticking(outputs: FeedbackOutputs, pattern: Vec<u64>) -> Self {
        let haptic_timer = outputs
            .haptics
            .is_some()
            .then(|| repeating(Duration::from_secs(1), true));

        Self {
            outputs,
            siren_running: false,
            siren_timer: None,
            haptic_timer,
            pattern,
        }
    }

    pub fn siren_running(&self) -> bool {
        self.siren_running
    }

    /// Wait for and perform the next scheduled output. Pends forever when
    /// nothing is scheduled. Cancel safe.
    pub async fn next_pulse(&mut self) {
        let pulse = tokio::select! {
            _ = tick(&mut self.siren_timer) => Pulse::Siren,
            _ = tick(&mut self.haptic_timer) => Pulse::Haptic,
        };

        match pulse {
            Pulse::Siren => {
                if let Some(siren) = &self.outputs.siren {
                    if let Err(e) = siren.retrigger() {
                        warn!("Siren retrigger failed: {}", e);
                    }
                }
            }
            Pulse::Haptic => self.outputs.vibrate(&self.pattern),
        }
    }
}

impl Drop for FeedbackGuard {
    fn drop(&mut self) {
        if self.siren_running {
            if let Some(siren) = &self.outputs.siren {
                siren.stop();
            }
        }
    }
}

fn repeating(period: Duration, immediate: bool) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let start = if immediate { Instant::now() } else { Instant::now() + period };
    let mut timer = interval_at(start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
