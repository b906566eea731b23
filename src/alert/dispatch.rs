// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Simulated emergency dispatch

use std::time::Duration;
use async_trait::async_trait;
use tracing::info;

use super::{AlertSession, Channel, ChannelStatus};
use crate::config::{DispatchConfig, EmergencyContact};
use crate::error::Result;
use crate::location;

/// Offsets from dispatch start at which each channel is notified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    offsets: [Duration; 3],
}

impl DispatchPlan {
    /// Offsets are clamped so they never decrease along the channel order
    pub fn new(police: Duration, ambulance: Duration, contacts: Duration) -> Self {
        let ambulance = ambulance.max(police);
        let contacts = contacts.max(ambulance);
        Self {
            offsets: [police, ambulance, contacts],
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.police_delay_ms),
            Duration::from_millis(config.ambulance_delay_ms),
            Duration::from_millis(config.contacts_delay_ms),
        )
    }

    pub fn offset(&self, channel: Channel) -> Duration {
        let i = Channel::ORDER.iter().position(|c| *c == channel).unwrap_or(0);
        self.offsets[i]
    }
}

impl Default for DispatchPlan {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Walks the channels in fixed order
#[derive(Debug, Clone)]
pub struct DispatchSequencer {
    plan: DispatchPlan,
    next: usize,
    status: ChannelStatus,
}

impl DispatchSequencer {
    pub fn new(plan: DispatchPlan) -> Self {
        Self {
            plan,
            next: 0,
            status: ChannelStatus::default(),
        }
    }

    /// Next channel and its offset from dispatch start
    pub fn next_due(&self) -> Option<(Channel, Duration)> {
        Channel::ORDER
            .get(self.next)
            .map(|c| (*c, self.plan.offset(*c)))
    }

    /// Mark the next channel notified
    pub fn advance(&mut self) -> Option<Channel> {
        let (channel, _) = self.next_due()?;
        if self.status.mark(channel) {
            self.next += 1;
            Some(channel)
        } else {
            None
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status.all_notified()
    }
}

/// Delivers a channel notification. Real SMS/call integrations plug in here.
#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    async fn notify(&self, channel: Channel, session: &AlertSession) -> Result<()>;
}

/// Logs what a real dispatcher would send
pub struct SimulatedNotifier {
    police_number: String,
    ambulance_number: String,
    contacts: Vec<EmergencyContact>,
}

impl SimulatedNotifier {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            police_number: config.police_number.clone(),
            ambulance_number: config.ambulance_number.clone(),
            contacts: config.contacts.clone(),
        }
    }

    pub fn label(&self, channel: Channel) -> String {
        match channel {
            Channel::Police => format!("Police ({})", self.police_number),
            Channel::Ambulance => format!("Ambulance ({})", self.ambulance_number),
            Channel::Contacts => "Emergency Contacts".to_string(),
        }
    }
}

#[async_trait]
impl DispatchNotifier for SimulatedNotifier {
    async fn notify(&self, channel: Channel, session: &AlertSession) -> Result<()> {
        let position = location::describe(session.location.as_ref());
        info!("📡 Notified {} - {}", self.label(channel), position);

        if channel == Channel::Contacts {
            for contact in &self.contacts {
                info!("   • {} ({}) {}", contact.name, contact.phone, contact.relation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_offsets() {
        let plan = DispatchPlan::default();
        assert_eq!(plan.offset(Channel::Police), Duration::from_millis(1500));
        assert_eq!(plan.offset(Channel::Ambulance), Duration::from_millis(2500));
        assert_eq!(plan.offset(Channel::Contacts), Duration::from_millis(3500));
    }

    #[test]
    fn test_plan_never_runs_backwards() {
        let plan = DispatchPlan::new(
            Duration::from_millis(3000),
            Duration::from_millis(1000),
            Duration::from_millis(2000),
        );
        assert_eq!(plan.offset(Channel::Ambulance), Duration::from_millis(3000));
        assert_eq!(plan.offset(Channel::Contacts), Duration::from_millis(3000));
    }

    #[test]
    fn test_sequencer_order_and_invariant() {
        let mut seq = DispatchSequencer::new(DispatchPlan::default());
        let mut order = vec![];
        while let Some(channel) = seq.advance() {
            let status = seq.status();
            assert!(!(status.ambulance && !status.police));
            assert!(!(status.contacts && !status.ambulance));
            order.push(channel);
        }
        assert_eq!(order, Channel::ORDER.to_vec());
        assert!(seq.is_complete());
        assert!(seq.next_due().is_none());
    }

    #[test]
    fn test_labels() {
        let notifier = SimulatedNotifier::new(&DispatchConfig::default());
        assert_eq!(notifier.label(Channel::Police), "Police (119)");
        assert_eq!(notifier.label(Channel::Ambulance), "Ambulance (1990)");
    }
}
