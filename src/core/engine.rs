// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Engine - owns the motion sampler and the alert controller

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use anyhow::Result;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{EventBus, SystemState};
use crate::alert::{
    AlertController, AlertHandle, AlertSettings, FeedbackOutputs, Haptics, LogHaptics, Siren,
    SimulatedNotifier,
};
use crate::config::{Config, DetectionConfig, FeedbackConfig};
use crate::location;
use crate::sensors::{
    CrashCallback, MotionSampler, MotionSource, ReplayMotionSource, SimulatedMotionSource,
};

/// Main CrashDoc engine
pub struct Engine {
    pub config: Arc<Config>,
    bus: Arc<EventBus>,
    alerts: AlertHandle,
    controller: Option<JoinHandle<()>>,
    sampler: Option<MotionSampler>,
    on_crash: CrashCallback,
    simulator: Option<Arc<SimulatedMotionSource>>,
    crash_signals: Arc<AtomicU64>,
    state: Arc<RwLock<SystemState>>,
    start_time: Option<Instant>,
}

impl Engine {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::default());

        let (alerts, controller) = AlertController::spawn(
            AlertSettings::from_config(&config),
            feedback_outputs(&config.feedback),
            Arc::new(SimulatedNotifier::new(&config.dispatch)),
            Arc::from(location::from_config(&config.location)),
            bus.clone(),
        );

        let crash_signals = Arc::new(AtomicU64::new(0));
        let on_crash: CrashCallback = {
            let forward = alerts.crash_callback();
            let counter = crash_signals.clone();
            Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                forward();
            })
        };
        let (sampler, simulator) = match motion_source(&config.detection) {
            Some((source, simulator)) => (
                Some(MotionSampler::new(source, config.detection.threshold, on_crash.clone())),
                simulator,
            ),
            None => {
                warn!("Crash detection unavailable; manual SOS still works");
                (None, None)
            }
        };

        Ok(Self {
            config,
            bus,
            alerts,
            controller: Some(controller),
            sampler,
            on_crash,
            simulator,
            crash_signals,
            state: Arc::new(RwLock::new(SystemState::default())),
            start_time: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting CrashDoc engine...");
        self.start_time = Some(Instant::now());

        if self.config.detection.auto_start {
            self.start_detection().await;
        }

        {
            let mut state = self.state.write().await;
            state.running = true;
        }

        self.bus.publish_status("engine", "running");
        info!("CrashDoc engine started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping CrashDoc engine...");

        if let Some(sampler) = self.sampler.as_mut() {
            sampler.stop();
        }
        self.alerts.shutdown().await;
        if let Some(controller) = self.controller.take() {
            controller.await?;
        }

        {
            let mut state = self.state.write().await;
            state.running = false;
            state.listening = false;
        }

        info!("CrashDoc engine stopped");
        Ok(())
    }

    /// Begin crash detection; stays idle if motion access is refused or
    /// there is no motion source
    pub async fn start_detection(&mut self) {
        let Some(sampler) = self.sampler.as_mut() else {
            self.bus.publish_status("detection", "unavailable");
            return;
        };
        sampler.start().await;
        let listening = sampler.is_listening();
        self.state.write().await.listening = listening;
        self.bus
            .publish_status("detection", if listening { "listening" } else { "inactive" });
    }

    pub async fn stop_detection(&mut self) {
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.stop();
        }
        self.state.write().await.listening = false;
        self.bus.publish_status("detection", "inactive");
    }

    /// Start detection if needed, then raise a crash signal. In demo mode
    /// the impact goes through the simulated sensor stream.
    pub async fn test_crash(&mut self) {
        if !self.is_listening() {
            self.start_detection().await;
        }
        match (&self.simulator, &self.sampler) {
            (Some(simulator), _) if self.is_listening() => simulator.inject_impact(),
            (_, Some(sampler)) => sampler.simulate_crash(),
            (_, None) => (self.on_crash)(),
        }
    }

    pub fn has_motion_source(&self) -> bool {
        self.sampler.is_some()
    }

    fn is_listening(&self) -> bool {
        self.sampler.as_ref().map_or(false, |s| s.is_listening())
    }

    pub fn alerts(&self) -> &AlertHandle {
        &self.alerts
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub async fn state(&self) -> SystemState {
        let mut state = self.state.read().await.clone();
        state.crash_signals = self.crash_signals.load(Ordering::Relaxed);
        state.uptime_seconds = self.uptime();
        state.session = self.alerts.session();
        state
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

type SourceChoice = (Arc<dyn MotionSource>, Option<Arc<SimulatedMotionSource>>);

/// Replay file first, then the simulator. Failures are logged and yield `None`.
fn motion_source(config: &DetectionConfig) -> Option<SourceChoice> {
    if let Some(path) = &config.replay_file {
        match ReplayMotionSource::open(path, config.sample_rate) {
            Ok(replay) => {
                let source: Arc<dyn MotionSource> = Arc::new(replay);
                return Some((source, None));
            }
            Err(e) => {
                warn!("Cannot replay {:?}: {}", path, e);
                return None;
            }
        }
    }

    if config.demo_mode {
        let simulator = Arc::new(
            SimulatedMotionSource::new("demo-accelerometer", config.sample_rate)
                .with_impact_probability(config.demo_impact_probability),
        );
        let source: Arc<dyn MotionSource> = simulator.clone();
        return Some((source, Some(simulator)));
    }

    warn!("No motion source: enable detection.demo_mode or set detection.replay_file");
    None
}

fn feedback_outputs(config: &FeedbackConfig) -> FeedbackOutputs {
    let siren = if config.audio_enabled { audio_siren(config) } else { None };
    let haptics: Option<Arc<dyn Haptics>> = if config.haptics_enabled {
        Some(Arc::new(LogHaptics))
    } else {
        None
    };
    FeedbackOutputs::new(siren, haptics)
}

#[cfg(feature = "audio")]
fn audio_siren(config: &FeedbackConfig) -> Option<Arc<dyn Siren>> {
    Some(Arc::new(crate::alert::CpalSiren::new(config)))
}

#[cfg(not(feature = "audio"))]
fn audio_siren(_config: &FeedbackConfig) -> Option<Arc<dyn Siren>> {
    Some(Arc::new(crate::alert::LogSiren))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertEvent, SessionState};
    use std::time::Duration;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.feedback.audio_enabled = false;
        config.detection.auto_start = false;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_crash_arms_countdown() {
        let mut engine = Engine::new(quiet_config()).await.unwrap();
        let mut events = engine.alerts().subscribe();
        engine.start().await.unwrap();

        engine.test_crash().await;
        match events.recv().await.unwrap() {
            AlertEvent::Armed { remaining, .. } => assert_eq!(remaining, 10),
            other => panic!("unexpected {:?}", other),
        }

        let state = engine.state().await;
        assert!(state.running);
        assert!(state.listening);
        assert!(state.crash_signals >= 1);
        assert_eq!(state.session.state, SessionState::Countdown { remaining: 10 });

        engine.alerts().cancel().await.unwrap();
        engine.stop().await.unwrap();
        assert!(!engine.state().await.listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_start_listens() {
        let mut config = quiet_config();
        config.detection.auto_start = true;
        let mut engine = Engine::new(config).await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.state().await.listening);

        engine.stop_detection().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!engine.state().await.listening);
        engine.stop().await.unwrap();
    }

    async fn run_sos_to_active(engine: &mut Engine) {
        let mut events = engine.alerts().subscribe();
        engine.start().await.unwrap();
        assert!(!engine.state().await.listening);

        engine.alerts().trigger_sos().await.unwrap();
        loop {
            if let AlertEvent::Active { .. } = events.recv().await.unwrap() {
                break;
            }
        }
        assert_eq!(engine.alerts().session().state, SessionState::Active);
        assert!(engine.alerts().session().channel_status.all_notified());

        engine.alerts().dismiss().await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_without_motion_source() {
        let mut config = quiet_config();
        config.detection.demo_mode = false;
        config.detection.auto_start = true;
        let mut engine = Engine::new(config).await.unwrap();
        assert!(!engine.has_motion_source());
        run_sos_to_active(&mut engine).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_with_missing_replay_file() {
        let mut config = quiet_config();
        config.detection.replay_file = Some("/nonexistent/trace.jsonl".into());
        let mut engine = Engine::new(config).await.unwrap();
        assert!(!engine.has_motion_source());
        run_sos_to_active(&mut engine).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_crash_without_motion_source() {
        let mut config = quiet_config();
        config.detection.demo_mode = false;
        let mut engine = Engine::new(config).await.unwrap();
        let mut events = engine.alerts().subscribe();
        engine.start().await.unwrap();

        engine.test_crash().await;
        match events.recv().await.unwrap() {
            AlertEvent::Armed { remaining, .. } => assert_eq!(remaining, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.state().await.crash_signals, 1);
        engine.alerts().cancel().await.unwrap();
        engine.stop().await.unwrap();
    }
}
