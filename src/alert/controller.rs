// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Alert controller - the single owner of the alert session
//!
//! One task holds the session, the confirmation gate, the dispatch
//! sequencer and the alarm outputs. Commands arrive on a channel and are
//! acknowledged once the transition is complete. Each state owns at most one
//! deadline in a [`StateTimer`]; leaving the state clears it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    AlertEvent, AlertOrigin, AlertSession, Channel, ConfirmationGate, DispatchNotifier,
    DispatchPlan, DispatchSequencer, FeedbackGuard, FeedbackOutputs, GateState, SessionState,
};
use crate::config::{AlertConfig, Config};
use crate::core::{EventBus, StateTimer};
use crate::error::{CrashDocError, Result};
use crate::location::{self, Location, LocationProvider};
use crate::sensors::CrashCallback;

const TICK: Duration = Duration::from_secs(1);

/// Timing and patterns used by the controller
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub alert: AlertConfig,
    pub plan: DispatchPlan,
    pub dispatch_pattern_ms: Vec<u64>,
    pub success_pattern_ms: Vec<u64>,
    pub location_timeout: Duration,
}

impl AlertSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            alert: config.alert.clone(),
            plan: DispatchPlan::from_config(&config.dispatch),
            dispatch_pattern_ms: config.dispatch.start_pattern_ms.clone(),
            success_pattern_ms: config.dispatch.success_pattern_ms.clone(),
            location_timeout: config.location.timeout(),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

type Ack = oneshot::Sender<Result<()>>;

enum Command {
    CrashDetected,
    Cancel(Ack),
    Confirm(Ack),
    TriggerSos(Ack),
    Dismiss(Ack),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle for driving the controller
#[derive(Clone)]
pub struct AlertHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<AlertSession>,
    bus: Arc<EventBus>,
}

impl AlertHandle {
    /// Report a crash signal. Never blocks, safe to call from the sampler.
    pub fn crash_detected(&self) {
        if self.commands.send(Command::CrashDetected).is_err() {
            debug!("Crash signal dropped, controller stopped");
        }
    }

    /// Callback suitable for [`crate::sensors::MotionSampler`]
    pub fn crash_callback(&self) -> CrashCallback {
        let handle = self.clone();
        Arc::new(move || handle.crash_detected())
    }

    /// "I am okay": abort the countdown
    pub async fn cancel(&self) -> Result<()> {
        self.request(Command::Cancel).await
    }

    /// Escalate the countdown to dispatch now
    pub async fn confirm(&self) -> Result<()> {
        self.request(Command::Confirm).await
    }

    /// Manual SOS
    pub async fn trigger_sos(&self) -> Result<()> {
        self.request(Command::TriggerSos).await
    }

    /// "I am safe now": return to idle
    pub async fn dismiss(&self) -> Result<()> {
        self.request(Command::Dismiss).await
    }

    /// Stop the controller, releasing any alarm outputs
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current session snapshot
    pub fn session(&self) -> AlertSession {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every session change
    pub fn watch(&self) -> watch::Receiver<AlertSession> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.bus.subscribe_alerts()
    }

    async fn request(&self, command: impl FnOnce(Ack) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| CrashDocError::ControllerStopped)?;
        rx.await.map_err(|_| CrashDocError::ControllerStopped)?
    }
}

/// Session state machine running on its own task
pub struct AlertController {
    settings: AlertSettings,
    session: AlertSession,
    gate: Option<ConfirmationGate>,
    sequencer: Option<DispatchSequencer>,
    dispatch_started: Option<Instant>,
    timer: StateTimer,
    feedback: Option<FeedbackGuard>,
    outputs: FeedbackOutputs,
    location: Arc<dyn LocationProvider>,
    location_tx: mpsc::UnboundedSender<(Uuid, Option<Location>)>,
    location_rx: mpsc::UnboundedReceiver<(Uuid, Option<Location>)>,
    notify_tx: mpsc::UnboundedSender<(Channel, AlertSession)>,
    snapshot: watch::Sender<AlertSession>,
    bus: Arc<EventBus>,
}

impl AlertController {
    /// Start the controller task. Notifications are delivered in order by a
    /// second task so a slow notifier never delays the session.
    pub fn spawn(
        settings: AlertSettings,
        outputs: FeedbackOutputs,
        notifier: Arc<dyn DispatchNotifier>,
        location: Arc<dyn LocationProvider>,
        bus: Arc<EventBus>,
    ) -> (AlertHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(AlertSession::idle());
        let (location_tx, location_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        tokio::spawn(deliver(notifier, notify_rx));

        let controller = Self {
            settings,
            session: AlertSession::idle(),
            gate: None,
            sequencer: None,
            dispatch_started: None,
            timer: StateTimer::new(),
            feedback: None,
            outputs,
            location,
            location_tx,
            location_rx,
            notify_tx,
            snapshot: snapshot_tx,
            bus: bus.clone(),
        };

        let task = tokio::spawn(controller.run(command_rx));
        let handle = AlertHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            bus,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Alert controller running");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::CrashDetected) => self.on_crash(),
                    Some(Command::Cancel(ack)) => { let _ = ack.send(self.cancel()); }
                    Some(Command::Confirm(ack)) => { let _ = ack.send(self.confirm()); }
                    Some(Command::TriggerSos(ack)) => { let _ = ack.send(self.trigger_sos()); }
                    Some(Command::Dismiss(ack)) => { let _ = ack.send(self.dismiss()); }
                    Some(Command::Shutdown(ack)) => {
                        self.reset();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.reset();
                        break;
                    }
                },
                deadline = self.timer.fired() => self.on_deadline(deadline),
                Some((id, fix)) = self.location_rx.recv() => self.on_location(id, fix),
                _ = pulse(&mut self.feedback) => {}
            }
        }

        info!("Alert controller stopped");
    }

    fn current_id(&self) -> Uuid {
        self.session.id.unwrap_or_default()
    }

    fn publish(&self, event: AlertEvent) {
        self.snapshot.send_replace(self.session.clone());
        self.bus.publish_alert(event);
    }

    fn on_crash(&mut self) {
        self.bus.publish_crash();
        if !self.session.is_idle() {
            debug!("Crash signal ignored while {}", self.session.state);
            return;
        }
        info!(
            "💥 Crash detected - {}s to cancel before dispatch",
            self.settings.alert.countdown_secs
        );
        self.arm(AlertOrigin::CrashDetected, self.settings.alert.countdown_secs);
    }

    fn arm(&mut self, origin: AlertOrigin, seconds: u32) {
        let gate = ConfirmationGate::arm(seconds);
        if !gate.is_armed() {
            self.session = AlertSession::begin(origin, SessionState::Dispatching);
            if origin == AlertOrigin::CrashDetected {
                self.publish(AlertEvent::Confirmed {
                    session: self.current_id(),
                });
            }
            self.begin_dispatch();
            return;
        }

        self.session = AlertSession::begin(origin, SessionState::Countdown { remaining: seconds });
        self.feedback = Some(match origin {
            AlertOrigin::CrashDetected => {
                FeedbackGuard::alarm(self.outputs.clone(), &self.settings.alert)
            }
            AlertOrigin::Manual => FeedbackGuard::ticking(
                self.outputs.clone(),
                self.settings.alert.sos_tick_pattern_ms.clone(),
            ),
        });
        self.gate = Some(gate);
        self.timer.set_after(TICK);

        self.publish(AlertEvent::Armed {
            session: self.current_id(),
            origin,
            remaining: seconds,
        });
    }

    fn on_deadline(&mut self, deadline: Instant) {
        match self.session.state {
            SessionState::Countdown { .. } => self.on_tick(deadline),
            SessionState::Dispatching => self.on_dispatch_due(deadline),
            SessionState::Idle | SessionState::Active => {}
        }
    }

    fn on_tick(&mut self, deadline: Instant) {
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        let state = gate.tick();
        let remaining = gate.remaining();

        debug!("Countdown {}s", remaining);
        self.session.state = SessionState::Countdown { remaining };
        self.publish(AlertEvent::CountdownTick {
            session: self.current_id(),
            remaining,
        });

        if state == GateState::Confirmed {
            info!("⏰ No response - escalating to emergency dispatch");
            self.escalate();
        } else {
            self.timer.set(deadline + TICK);
        }
    }

    fn escalate(&mut self) {
        self.gate = None;
        self.feedback = None;
        self.publish(AlertEvent::Confirmed {
            session: self.current_id(),
        });
        self.begin_dispatch();
    }

    fn begin_dispatch(&mut self) {
        let started = Instant::now();
        let sequencer = DispatchSequencer::new(self.settings.plan.clone());
        match sequencer.next_due() {
            Some((_, offset)) => self.timer.set(started + offset),
            None => self.timer.clear(),
        }
        self.sequencer = Some(sequencer);
        self.dispatch_started = Some(started);
        self.session.state = SessionState::Dispatching;

        info!("🚨 Dispatching emergency alert");
        self.outputs.vibrate(&self.settings.dispatch_pattern_ms);
        self.request_location();

        self.publish(AlertEvent::DispatchStarted {
            session: self.current_id(),
        });
    }

    fn request_location(&self) {
        let id = self.current_id();
        let provider = self.location.clone();
        let tx = self.location_tx.clone();
        let timeout = self.settings.location_timeout;

        tokio::spawn(async move {
            let fix = location::locate(provider.as_ref(), timeout).await;
            let _ = tx.send((id, fix));
        });
    }

    fn on_location(&mut self, id: Uuid, fix: Option<Location>) {
        if self.session.id != Some(id) {
            debug!("Discarding location for finished session {}", id);
            return;
        }
        self.session.location = fix;
        self.snapshot.send_replace(self.session.clone());
    }

    fn on_dispatch_due(&mut self, deadline: Instant) {
        let (Some(sequencer), Some(started)) = (self.sequencer.as_mut(), self.dispatch_started)
        else {
            return;
        };
        let elapsed = deadline.saturating_duration_since(started);

        let mut notified = Vec::new();
        while let Some((_, offset)) = sequencer.next_due() {
            if offset > elapsed {
                break;
            }
            match sequencer.advance() {
                Some(channel) => notified.push(channel),
                None => break,
            }
        }
        let next = sequencer.next_due().map(|(_, offset)| started + offset);
        let complete = sequencer.is_complete();

        for channel in notified {
            self.session.channel_status.mark(channel);
            let _ = self.notify_tx.send((channel, self.session.clone()));
            self.publish(AlertEvent::ChannelNotified {
                session: self.current_id(),
                channel,
            });
        }

        if complete {
            self.sequencer = None;
            self.dispatch_started = None;
            self.session.state = SessionState::Active;
            info!("✅ All channels notified - help is on the way");
            self.outputs.vibrate(&self.settings.success_pattern_ms);
            self.publish(AlertEvent::Active {
                session: self.current_id(),
            });
        } else if let Some(next) = next {
            self.timer.set(next);
        }
    }

    fn cancel(&mut self) -> Result<()> {
        if !matches!(self.session.state, SessionState::Countdown { .. }) {
            return Err(CrashDocError::invalid("cancel", self.session.state));
        }
        if let Some(gate) = self.gate.as_mut() {
            gate.cancel();
        }

        let id = self.current_id();
        self.reset();
        info!("👍 Alert cancelled by user");
        self.publish(AlertEvent::Cancelled { session: id });
        Ok(())
    }

    fn confirm(&mut self) -> Result<()> {
        let armed = self.gate.as_mut().map(|gate| gate.confirm()).unwrap_or(false);
        if !armed {
            return Err(CrashDocError::invalid("confirm", self.session.state));
        }
        info!("User confirmed emergency");
        self.escalate();
        Ok(())
    }

    fn trigger_sos(&mut self) -> Result<()> {
        match self.session.state {
            SessionState::Idle => {
                info!("🆘 Manual SOS");
                self.arm(AlertOrigin::Manual, self.settings.alert.sos_countdown_secs);
                Ok(())
            }
            SessionState::Countdown { .. } => self.confirm(),
            SessionState::Dispatching | SessionState::Active => {
                debug!("SOS ignored, dispatch already {}", self.session.state);
                Ok(())
            }
        }
    }

    fn dismiss(&mut self) -> Result<()> {
        match self.session.state {
            SessionState::Idle => Ok(()),
            SessionState::Countdown { .. } => {
                Err(CrashDocError::invalid("dismiss", self.session.state))
            }
            SessionState::Dispatching | SessionState::Active => {
                let id = self.current_id();
                self.reset();
                info!("User is safe - alert dismissed");
                self.publish(AlertEvent::Dismissed { session: id });
                Ok(())
            }
        }
    }

    /// Drop every per-session resource and return to idle
    fn reset(&mut self) {
        self.timer.clear();
        self.gate = None;
        self.sequencer = None;
        self.dispatch_started = None;
        self.feedback = None;
        self.session = AlertSession::idle();
        self.snapshot.send_replace(self.session.clone());
    }
}

async fn pulse(feedback: &mut Option<FeedbackGuard>) {
    match feedback {
        Some(guard) => guard.next_pulse().await,
        None => std::future::pending().await,
    }
}

async fn deliver(
    notifier: Arc<dyn DispatchNotifier>,
    mut rx: mpsc::UnboundedReceiver<(Channel, AlertSession)>,
) {
    while let Some((channel, session)) = rx.recv().await {
        if let Err(e) = notifier.notify(channel, &session).await {
            error!("Failed to notify {}: {}", channel, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::feedback::tests::{RecordingHaptics, RecordingSiren};
    use crate::location::FixedLocation;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(Channel, Option<Location>)>>,
        fail: bool,
    }

    #[async_trait]
    impl DispatchNotifier for RecordingNotifier {
        async fn notify(&self, channel: Channel, session: &AlertSession) -> Result<()> {
            self.calls.lock().push((channel, session.location));
            if self.fail {
                return Err(CrashDocError::Io(std::io::Error::other("gateway down")));
            }
            Ok(())
        }
    }

    struct Harness {
        handle: AlertHandle,
        events: broadcast::Receiver<AlertEvent>,
        siren: Arc<RecordingSiren>,
        haptics: Arc<RecordingHaptics>,
        notifier: Arc<RecordingNotifier>,
        task: JoinHandle<()>,
    }

    fn colombo() -> Location {
        Location::new(6.9271, 79.8612)
    }

    fn harness_with(settings: AlertSettings, notifier: RecordingNotifier) -> Harness {
        let siren = Arc::new(RecordingSiren::default());
        let haptics = Arc::new(RecordingHaptics::default());
        let notifier = Arc::new(notifier);
        let outputs = FeedbackOutputs::new(Some(siren.clone()), Some(haptics.clone()));
        let bus = Arc::new(EventBus::new(256));
        let events = bus.subscribe_alerts();

        let (handle, task) = AlertController::spawn(
            settings,
            outputs,
            notifier.clone(),
            Arc::new(FixedLocation::new(colombo())),
            bus,
        );

        Harness { handle, events, siren, haptics, notifier, task }
    }

    fn harness() -> Harness {
        harness_with(AlertSettings::default(), RecordingNotifier::default())
    }

    fn count_patterns(h: &Harness, pattern: &[u64]) -> usize {
        h.haptics.patterns.lock().iter().filter(|p| p.as_slice() == pattern).count()
    }

    fn alarm_pulses(h: &Harness) -> usize {
        count_patterns(h, &AlertConfig::default().alarm_pattern_ms)
    }

    async fn run_to_active(h: &mut Harness) {
        loop {
            if let AlertEvent::Active { .. } = h.events.recv().await.unwrap() {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_crash_dispatches_in_order() {
        let mut h = harness();
        let start = Instant::now();
        h.handle.crash_detected();

        let mut remaining = vec![];
        loop {
            match h.events.recv().await.unwrap() {
                AlertEvent::Armed { remaining: r, origin, .. } => {
                    assert_eq!(origin, AlertOrigin::CrashDetected);
                    assert!(h.siren.running.load(Ordering::SeqCst));
                    remaining.push(r);
                }
                AlertEvent::CountdownTick { remaining: r, .. } => remaining.push(r),
                AlertEvent::Confirmed { .. } => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(remaining, (0..=10).rev().collect::<Vec<u32>>());
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(!h.siren.running.load(Ordering::SeqCst));

        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::DispatchStarted { .. }));
        assert_eq!(h.handle.session().state, SessionState::Dispatching);

        for (channel, at_ms) in [
            (Channel::Police, 11_500),
            (Channel::Ambulance, 12_500),
            (Channel::Contacts, 13_500),
        ] {
            match h.events.recv().await.unwrap() {
                AlertEvent::ChannelNotified { channel: c, .. } => assert_eq!(c, channel),
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(start.elapsed(), Duration::from_millis(at_ms));
        }

        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Active { .. }));
        assert_eq!(start.elapsed(), Duration::from_millis(13_500));

        let session = h.handle.session();
        assert_eq!(session.state, SessionState::Active);
        assert!(session.channel_status.all_notified());
        assert_eq!(session.location, Some(colombo()));

        let patterns = h.haptics.patterns.lock().clone();
        assert!(patterns.contains(&vec![500, 200, 500, 200, 500]));
        assert_eq!(patterns.last(), Some(&vec![100, 50, 100]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_at_six_stops_everything() {
        let mut h = harness();
        h.handle.crash_detected();

        loop {
            if let AlertEvent::CountdownTick { remaining: 6, .. } = h.events.recv().await.unwrap() {
                break;
            }
        }
        h.handle.cancel().await.unwrap();
        let pulses = alarm_pulses(&h);
        assert!(pulses > 0);

        assert!(h.handle.session().is_idle());
        assert!(!h.siren.running.load(Ordering::SeqCst));
        assert_eq!(h.siren.stops.load(Ordering::SeqCst), 1);
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Cancelled { .. }));

        let later = tokio::time::timeout(Duration::from_secs(30), h.events.recv()).await;
        assert!(later.is_err());
        assert!(h.notifier.calls.lock().is_empty());
        assert_eq!(alarm_pulses(&h), pulses);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_skips_remaining_countdown() {
        let mut h = harness();
        let start = Instant::now();
        h.handle.crash_detected();
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Armed { .. }));

        h.handle.confirm().await.unwrap();
        assert_eq!(h.handle.session().state, SessionState::Dispatching);
        assert!(!h.siren.running.load(Ordering::SeqCst));
        let pulses = alarm_pulses(&h);

        let err = h.handle.cancel().await.unwrap_err();
        assert!(matches!(err, CrashDocError::InvalidTransition { .. }));

        run_to_active(&mut h).await;
        assert_eq!(start.elapsed(), Duration::from_millis(3_500));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(alarm_pulses(&h), pulses);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_stops_alarm_haptics() {
        let mut h = harness();
        h.handle.crash_detected();
        loop {
            if let AlertEvent::Confirmed { .. } = h.events.recv().await.unwrap() {
                break;
            }
        }
        let pulses = alarm_pulses(&h);
        assert!(pulses > 0);

        run_to_active(&mut h).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(alarm_pulses(&h), pulses);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_countdown_crash_reports_confirmation() {
        let mut settings = AlertSettings::default();
        settings.alert.countdown_secs = 0;
        let mut h = harness_with(settings, RecordingNotifier::default());

        h.handle.crash_detected();
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Confirmed { .. }));
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::DispatchStarted { .. }));
        assert_eq!(h.handle.session().origin, Some(AlertOrigin::CrashDetected));
        assert_eq!(h.siren.starts.load(Ordering::SeqCst), 0);
        run_to_active(&mut h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_outside_countdown_are_rejected() {
        let h = harness();
        assert!(matches!(
            h.handle.cancel().await,
            Err(CrashDocError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.handle.confirm().await,
            Err(CrashDocError::InvalidTransition { .. })
        ));
        h.handle.dismiss().await.unwrap();

        h.handle.crash_detected();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            h.handle.dismiss().await,
            Err(CrashDocError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_ignored_while_session_exists() {
        let mut h = harness();
        h.handle.crash_detected();
        run_to_active(&mut h).await;
        let id = h.handle.session().id;

        h.handle.crash_detected();
        tokio::time::sleep(Duration::from_secs(20)).await;

        let session = h.handle.session();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.id, id);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_then_new_cycle_starts_clean() {
        let mut h = harness();
        h.handle.crash_detected();
        run_to_active(&mut h).await;
        let first = h.handle.session().id;

        h.handle.dismiss().await.unwrap();
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Dismissed { .. }));
        let session = h.handle.session();
        assert!(session.is_idle());
        assert!(!session.channel_status.police);

        h.handle.crash_detected();
        match h.events.recv().await.unwrap() {
            AlertEvent::Armed { session, remaining, .. } => {
                assert_ne!(Some(session), first);
                assert_eq!(remaining, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.handle.session().channel_status, Default::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sos_dispatches_directly() {
        let mut h = harness();
        let start = Instant::now();
        h.handle.trigger_sos().await.unwrap();

        let session = h.handle.session();
        assert_eq!(session.state, SessionState::Dispatching);
        assert_eq!(session.origin, Some(AlertOrigin::Manual));
        assert_eq!(h.siren.starts.load(Ordering::SeqCst), 0);

        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::DispatchStarted { .. }));
        h.handle.trigger_sos().await.unwrap();

        run_to_active(&mut h).await;
        assert_eq!(start.elapsed(), Duration::from_millis(3_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sos_pre_countdown() {
        let mut settings = AlertSettings::default();
        settings.alert.sos_countdown_secs = 3;
        let mut h = harness_with(settings, RecordingNotifier::default());
        let start = Instant::now();

        h.handle.trigger_sos().await.unwrap();
        assert_eq!(h.handle.session().state, SessionState::Countdown { remaining: 3 });

        loop {
            if let AlertEvent::DispatchStarted { .. } = h.events.recv().await.unwrap() {
                break;
            }
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(h.siren.starts.load(Ordering::SeqCst), 0);
        assert_eq!(count_patterns(&h, &[50]), 3);

        run_to_active(&mut h).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count_patterns(&h, &[50]), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_during_countdown_confirms() {
        let mut h = harness();
        h.handle.crash_detected();
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Armed { .. }));

        h.handle.trigger_sos().await.unwrap();
        assert_eq!(h.handle.session().state, SessionState::Dispatching);
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Confirmed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_never_break_channel_order() {
        let h = harness();
        let mut watch = h.handle.watch();
        h.handle.trigger_sos().await.unwrap();

        loop {
            watch.changed().await.unwrap();
            let session = watch.borrow_and_update().clone();
            let status = session.channel_status;
            assert!(!(status.ambulance && !status.police));
            assert!(!(status.contacts && !status.ambulance));
            if session.state == SessionState::Active {
                assert!(status.all_notified());
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_sees_channels_in_order_despite_errors() {
        let notifier = RecordingNotifier { fail: true, ..Default::default() };
        let mut h = harness_with(AlertSettings::default(), notifier);
        h.handle.trigger_sos().await.unwrap();
        run_to_active(&mut h).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let channels: Vec<Channel> = h.notifier.calls.lock().iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, Channel::ORDER.to_vec());
        assert!(h.handle.session().channel_status.all_notified());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_callback_arms_countdown() {
        let mut h = harness();
        let callback = h.handle.crash_callback();
        callback();

        match h.events.recv().await.unwrap() {
            AlertEvent::Armed { origin, .. } => assert_eq!(origin, AlertOrigin::CrashDetected),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_feedback() {
        let mut h = harness();
        h.handle.crash_detected();
        assert!(matches!(h.events.recv().await.unwrap(), AlertEvent::Armed { .. }));

        h.handle.shutdown().await;
        (&mut h.task).await.unwrap();
        assert!(!h.siren.running.load(Ordering::SeqCst));

        let pulses = alarm_pulses(&h);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(alarm_pulses(&h), pulses);
        assert!(matches!(h.handle.cancel().await, Err(CrashDocError::ControllerStopped)));
    }
}
