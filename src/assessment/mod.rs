// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Damage assessment - AI estimate of severity, cost and fault
//!
//! A finished report is assessed from all photos at once. If that fails the
//! first photo is assessed alone, and if that fails too a fixed placeholder
//! asks for manual review. Reports without photos get a demonstration
//! result.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::AssessmentConfig;
use crate::error::Result;
use crate::report::Photo;

/// Condition of a damaged part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Crushed,
    Scratched,
    Broken,
    Dented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagedPart {
    pub part: String,
    pub status: PartStatus,
}

impl DamagedPart {
    pub fn new(part: &str, status: PartStatus) -> Self {
        Self {
            part: part.to_string(),
            status,
        }
    }
}

/// Repair cost range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedCost {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultAnalysis {
    pub likely_fault: String,
    /// Percentage, 0-100
    pub confidence: f64,
}

/// Assessment returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageAssessment {
    /// 1 (cosmetic) to 10 (total loss)
    pub severity_score: f64,
    pub estimated_cost: EstimatedCost,
    pub parts_damaged: Vec<DamagedPart>,
    pub fault_analysis: FaultAnalysis,
    pub recommended_action: String,
}

impl DamageAssessment {
    /// Placeholder used when the service cannot assess the photos
    pub fn fallback() -> Self {
        Self {
            severity_score: 5.0,
            estimated_cost: EstimatedCost {
                min: 500.0,
                max: 1000.0,
                currency: "USD".to_string(),
            },
            parts_damaged: vec![DamagedPart::new("Unknown", PartStatus::Scratched)],
            fault_analysis: FaultAnalysis {
                likely_fault: "Analysis Failed - Please Retake Photos".to_string(),
                confidence: 0.0,
            },
            recommended_action: "Manual review required".to_string(),
        }
    }

    /// Result shown for a report finished without photos
    pub fn demo() -> Self {
        Self {
            severity_score: 7.0,
            estimated_cost: EstimatedCost {
                min: 1200.0,
                max: 1500.0,
                currency: "USD".to_string(),
            },
            parts_damaged: vec![
                DamagedPart::new("Front Bumper", PartStatus::Crushed),
                DamagedPart::new("Headlight", PartStatus::Broken),
            ],
            fault_analysis: FaultAnalysis {
                likely_fault: "Rear-ending vehicle".to_string(),
                confidence: 85.0,
            },
            recommended_action: "Do not drive. Tow required.".to_string(),
        }
    }

    /// Clamp service output into the documented ranges
    pub fn normalized(mut self) -> Self {
        self.severity_score = self.severity_score.clamp(1.0, 10.0);
        self.fault_analysis.confidence = self.fault_analysis.confidence.clamp(0.0, 100.0);
        if self.estimated_cost.min > self.estimated_cost.max {
            std::mem::swap(&mut self.estimated_cost.min, &mut self.estimated_cost.max);
        }
        if self.estimated_cost.currency.is_empty() {
            self.estimated_cost.currency = "USD".to_string();
        }
        self
    }
}

/// Remote assessment backend
#[async_trait]
pub trait AssessmentService: Send + Sync {
    /// Assess every photo together
    async fn assess_all(&self, photos: &[Photo]) -> Result<DamageAssessment>;

    /// Assess one photo on its own
    async fn assess_one(&self, photo: &Photo) -> Result<DamageAssessment>;
}

/// Build the configured service, if any
pub fn from_config(config: &AssessmentConfig) -> Option<Box<dyn AssessmentService>> {
    if !config.enabled {
        info!("Damage assessment disabled");
        return None;
    }
    match config.resolved_api_key() {
        Some(key) => Some(Box::new(GeminiClient::new(config, key))),
        None => {
            warn!("No assessment API key configured (set assessment.api_key or GEMINI_API_KEY)");
            None
        }
    }
}

/// Run the assessment chain for a finished report. Never fails.
pub async fn assess_report(
    service: Option<&dyn AssessmentService>,
    photos: &[Photo],
) -> DamageAssessment {
    let Some(first) = photos.first() else {
        info!("No photos captured - using demonstration assessment");
        return DamageAssessment::demo();
    };

    let Some(service) = service else {
        warn!("Assessment service unavailable - manual review required");
        return DamageAssessment::fallback();
    };

    info!("Assessing {} photos from all angles", photos.len());
    match service.assess_all(photos).await {
        Ok(assessment) => return assessment,
        Err(e) => warn!("Multi-photo assessment failed, retrying with one photo: {}", e),
    }

    match service.assess_one(first).await {
        Ok(assessment) => assessment,
        Err(e) => {
            error!("Assessment failed: {}", e);
            DamageAssessment::fallback()
        }
    }
}
