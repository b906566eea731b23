// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Motion sampler - turns an acceleration stream into crash signals
//!
//! Only the previous complete sample is retained. A crash fires when the
//! magnitude changes by more than the threshold between two consecutive
//! samples. There is no smoothing or cooldown, so a sustained high-delta
//! signal fires on every qualifying pair.

use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{MotionSample, MotionSource, RawMotion};

/// Invoked once per qualifying sample pair, on the listener task.
///
/// The callback may query the sampler through [`SamplerStatus`]. It must not
/// call [`MotionSampler::stop`], which waits for an in-flight callback.
pub type CrashCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Default impact threshold in m/s²
pub const DEFAULT_THRESHOLD: f64 = 20.0;

/// Delta-magnitude impact check over consecutive samples
#[derive(Debug, Clone)]
pub struct ImpactDetector {
    threshold: f64,
    previous: Option<MotionSample>,
}

impl ImpactDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn previous(&self) -> Option<MotionSample> {
        self.previous
    }

    /// Process one reading; returns true when the pair crosses the threshold.
    /// Incomplete readings are ignored and leave the retained sample alone.
    pub fn process(&mut self, raw: &RawMotion) -> bool {
        let Some(current) = raw.complete() else {
            return false;
        };

        let crashed = match self.previous {
            Some(previous) => {
                let delta = (current.magnitude() - previous.magnitude()).abs();
                if delta > self.threshold {
                    debug!("Impact delta {:.2} m/s² exceeds {:.2}", delta, self.threshold);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        self.previous = Some(current);
        crashed
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl Default for ImpactDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Read-only view of a sampler, safe to use from inside the crash callback
#[derive(Clone)]
pub struct SamplerStatus {
    /// Generation of the listener allowed to fire; None when stopped
    active: Arc<RwLock<Option<u64>>>,
    detector: Arc<Mutex<ImpactDetector>>,
}

impl SamplerStatus {
    pub fn is_listening(&self) -> bool {
        self.active.read_recursive().is_some()
    }

    /// Most recent retained sample, if any
    pub fn last_sample(&self) -> Option<MotionSample> {
        self.detector.lock().previous()
    }
}

/// Subscribes to a motion source and reports crashes through a callback
pub struct MotionSampler {
    source: Arc<dyn MotionSource>,
    on_crash: CrashCallback,
    status: SamplerStatus,
    next_generation: u64,
    task: Option<JoinHandle<()>>,
}

impl MotionSampler {
    pub fn new(source: Arc<dyn MotionSource>, threshold: f64, on_crash: CrashCallback) -> Self {
        Self {
            source,
            on_crash,
            status: SamplerStatus {
                active: Arc::new(RwLock::new(None)),
                detector: Arc::new(Mutex::new(ImpactDetector::new(threshold))),
            },
            next_generation: 0,
            task: None,
        }
    }

    pub fn status(&self) -> SamplerStatus {
        self.status.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.status.is_listening()
    }

    /// Most recent retained sample, if any
    pub fn last_sample(&self) -> Option<MotionSample> {
        self.status.last_sample()
    }

    /// Begin listening. A denied or failed permission request is logged and
    /// leaves the sampler idle; the crash callback is not involved.
    pub async fn start(&mut self) {
        if self.is_listening() {
            return;
        }

        match self.source.request_permission().await {
            Ok(permission) if permission.allows_access() => {}
            Ok(_) => {
                warn!("Motion permission denied for {}", self.source.id());
                return;
            }
            Err(e) => {
                error!("Motion permission request failed for {}: {}", self.source.id(), e);
                return;
            }
        }

        let mut rx = match self.source.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Failed to subscribe to {}: {}", self.source.id(), e);
                return;
            }
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        *self.status.active.write() = Some(generation);

        let status = self.status.clone();
        let on_crash = self.on_crash.clone();
        self.task = Some(tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                // Held across the callback so stop() cannot return while a
                // crash notification is in flight.
                let active = status.active.read_recursive();
                if *active != Some(generation) {
                    break;
                }
                let crashed = status.detector.lock().process(&raw);
                if crashed {
                    on_crash();
                }
            }
            debug!("Motion listener {} finished", generation);
        }));

        info!("Crash detection listening on {}", self.source.id());
    }

    /// Stop listening and forget the retained sample. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let was_listening = self.status.active.write().take().is_some();
        self.status.detector.lock().reset();

        if let Some(task) = self.task.take() {
            task.abort();
        }

        if was_listening {
            info!("Crash detection stopped on {}", self.source.id());
        }
    }

    /// Fire the crash callback without sensor data
    pub fn simulate_crash(&self) {
        info!("Simulated crash requested");
        (self.on_crash)();
    }
}

impl Drop for MotionSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CrashDocError, Result};
    use crate::sensors::Permission;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn sample(x: f64, y: f64, z: f64) -> RawMotion {
        MotionSample::new(x, y, z).into()
    }

    struct ScriptedSource {
        permission: Option<Permission>,
        sender: Mutex<Option<mpsc::Sender<RawMotion>>>,
        subscriptions: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(permission: Option<Permission>) -> Arc<Self> {
            Arc::new(Self {
                permission,
                sender: Mutex::new(None),
                subscriptions: AtomicUsize::new(0),
            })
        }

        fn sender(&self) -> mpsc::Sender<RawMotion> {
            self.sender.lock().clone().expect("not subscribed")
        }
    }

    #[async_trait]
    impl MotionSource for ScriptedSource {
        fn id(&self) -> &str { "scripted" }

        async fn request_permission(&self) -> Result<Permission> {
            self.permission
                .ok_or_else(|| CrashDocError::Sensor("prompt dismissed".to_string()))
        }

        async fn subscribe(&self) -> Result<mpsc::Receiver<RawMotion>> {
            let (tx, rx) = mpsc::channel(64);
            *self.sender.lock() = Some(tx);
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            Ok(rx)
        }
    }

    fn counting_callback() -> (CrashCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (Arc::new(move || { c.fetch_add(1, Ordering::SeqCst); }), count)
    }

    #[test]
    fn test_delta_above_threshold_fires() {
        let mut detector = ImpactDetector::new(20.0);
        assert!(!detector.process(&sample(0.0, 0.0, 0.0)));
        assert!(detector.process(&sample(0.0, 0.0, 25.0)));
    }

    #[test]
    fn test_delta_below_threshold_does_not_fire() {
        let mut detector = ImpactDetector::new(20.0);
        assert!(!detector.process(&sample(0.0, 0.0, 0.0)));
        assert!(!detector.process(&sample(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_delta_equal_to_threshold_does_not_fire() {
        let mut detector = ImpactDetector::new(20.0);
        detector.process(&sample(0.0, 0.0, 0.0));
        assert!(!detector.process(&sample(0.0, 0.0, 20.0)));
    }

    #[test]
    fn test_sample_replaced_after_crash() {
        let mut detector = ImpactDetector::new(20.0);
        detector.process(&sample(0.0, 0.0, 0.0));
        assert!(detector.process(&sample(0.0, 0.0, 25.0)));
        assert_eq!(detector.previous(), Some(MotionSample::new(0.0, 0.0, 25.0)));
        // 25 -> 30 is a small delta against the new baseline
        assert!(!detector.process(&sample(0.0, 0.0, 30.0)));
    }

    #[test]
    fn test_sustained_oscillation_fires_every_pair() {
        let mut detector = ImpactDetector::new(20.0);
        let fired = [0.0, 30.0, 0.0, 30.0, 0.0]
            .iter()
            .filter(|z| detector.process(&sample(0.0, 0.0, **z)))
            .count();
        assert_eq!(fired, 4);
    }

    #[test]
    fn test_incomplete_reading_keeps_previous() {
        let mut detector = ImpactDetector::new(20.0);
        detector.process(&sample(0.0, 0.0, 0.0));
        let partial = RawMotion { x: Some(0.0), y: Some(0.0), z: None };
        assert!(!detector.process(&partial));
        assert_eq!(detector.previous(), Some(MotionSample::new(0.0, 0.0, 0.0)));
        assert!(detector.process(&sample(0.0, 0.0, 25.0)));
    }

    #[tokio::test]
    async fn test_start_streams_crashes() {
        let source = ScriptedSource::new(Some(Permission::NotRequired));
        let (callback, count) = counting_callback();
        let mut sampler = MotionSampler::new(source.clone(), 20.0, callback);

        sampler.start().await;
        assert!(sampler.is_listening());

        let tx = source.sender();
        tx.send(sample(0.0, 0.0, 0.0)).await.unwrap();
        tx.send(sample(0.0, 0.0, 25.0)).await.unwrap();
        tx.send(sample(0.0, 0.0, 26.0)).await.unwrap();

        for _ in 0..50 {
            if sampler.last_sample() == Some(MotionSample::new(0.0, 0.0, 26.0)) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_can_query_sampler() {
        let source = ScriptedSource::new(Some(Permission::NotRequired));
        let slot: Arc<Mutex<Option<SamplerStatus>>> = Arc::new(Mutex::new(None));
        let seen: Arc<Mutex<Vec<(bool, Option<MotionSample>)>>> = Arc::new(Mutex::new(vec![]));

        let callback: CrashCallback = {
            let slot = slot.clone();
            let seen = seen.clone();
            Arc::new(move || {
                if let Some(status) = slot.lock().as_ref() {
                    seen.lock().push((status.is_listening(), status.last_sample()));
                }
            })
        };
        let mut sampler = MotionSampler::new(source.clone(), 20.0, callback);
        *slot.lock() = Some(sampler.status());
        sampler.start().await;

        let tx = source.sender();
        tx.send(sample(0.0, 0.0, 0.0)).await.unwrap();
        tx.send(sample(0.0, 0.0, 25.0)).await.unwrap();

        for _ in 0..50 {
            if !seen.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            seen.lock().as_slice(),
            &[(true, Some(MotionSample::new(0.0, 0.0, 25.0)))]
        );

        sampler.stop();
        assert!(!sampler.status().is_listening());
        assert_eq!(sampler.status().last_sample(), None);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let source = ScriptedSource::new(Some(Permission::Granted));
        let (callback, _) = counting_callback();
        let mut sampler = MotionSampler::new(source.clone(), 20.0, callback);

        sampler.start().await;
        sampler.start().await;
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_stays_idle() {
        let source = ScriptedSource::new(Some(Permission::Denied));
        let (callback, count) = counting_callback();
        let mut sampler = MotionSampler::new(source.clone(), 20.0, callback);

        sampler.start().await;
        assert!(!sampler.is_listening());
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permission_error_stays_idle() {
        let source = ScriptedSource::new(None);
        let (callback, count) = counting_callback();
        let mut sampler = MotionSampler::new(source, 20.0, callback);

        sampler.start().await;
        assert!(!sampler.is_listening());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_twice_and_no_callbacks_after_stop() {
        let source = ScriptedSource::new(Some(Permission::Granted));
        let (callback, count) = counting_callback();
        let mut sampler = MotionSampler::new(source.clone(), 20.0, callback);

        sampler.start().await;
        let tx = source.sender();
        tx.send(sample(0.0, 0.0, 0.0)).await.unwrap();

        sampler.stop();
        sampler.stop();
        assert!(!sampler.is_listening());
        assert!(sampler.last_sample().is_none());

        let _ = tx.send(sample(0.0, 0.0, 50.0)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_simulate_crash_without_listening() {
        let source = ScriptedSource::new(Some(Permission::Denied));
        let (callback, count) = counting_callback();
        let sampler = MotionSampler::new(source, 20.0, callback);

        sampler.simulate_crash();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
