// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Gemini `generateContent` client

use std::time::Duration;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{AssessmentService, DamageAssessment};
use crate::config::AssessmentConfig;
use crate::error::{CrashDocError, Result};
use crate::report::Photo;

const SINGLE_PHOTO_PROMPT: &str = "You are an expert automotive damage assessor and insurance adjuster with 20+ years of experience. Analyze this accident scene image with high precision.

1. SEVERITY SCORE (1-10): 1-3 minor (cosmetic scratches, small dents), 4-6 moderate (broken lights, damaged panels), 7-9 severe (major structural or frame damage, airbag deployment), 10 total loss.
2. COST ESTIMATION: realistic repair cost range in USD covering parts, labor, paint and any visible structural repair.
3. PARTS DAMAGED: every visible damaged component (bumper, hood, fender, door, headlight, taillight, mirror, windshield, quarter panel, grille, wheel, tire). Status is 'crushed' (severe deformation), 'broken' (cracked/shattered), 'scratched' (surface damage) or 'dented' (minor deformation).
4. FAULT ANALYSIS: likely fault from impact points, damage distribution and crumple zones, with a confidence percentage (0-100).
5. RECOMMENDED ACTION: clear next steps such as contacting insurance, towing, or driving carefully to a shop.

Return ONLY valid JSON with no markdown formatting.";

fn multi_photo_prompt(count: usize) -> String {
    format!(
        "You are analyzing {} photos of a vehicle accident from different angles (front, rear, left, right, and close-ups).

Analyze ALL images together to provide a complete 360° assessment:
1. SEVERITY SCORE (1-10): combine damage from all angles
2. COST ESTIMATION: total repair cost based on ALL visible damage
3. PARTS DAMAGED: every damaged component seen across all photos
4. FAULT ANALYSIS: use damage distribution across the vehicle to determine collision type and likely fault
5. RECOMMENDED ACTION: based on total damage severity

Provide the most accurate professional assessment possible using all available visual data.",
        count
    )
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "severity_score": { "type": "NUMBER", "description": "Score from 1-10" },
            "estimated_cost": {
                "type": "OBJECT",
                "properties": {
                    "min": { "type": "NUMBER" },
                    "max": { "type": "NUMBER" },
                    "currency": { "type": "STRING" }
                },
                "required": ["min", "max", "currency"]
            },
            "parts_damaged": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "part": { "type": "STRING" },
                        "status": {
                            "type": "STRING",
                            "enum": ["crushed", "scratched", "broken", "dented"]
                        }
                    },
                    "required": ["part", "status"]
                }
            },
            "fault_analysis": {
                "type": "OBJECT",
                "properties": {
                    "likely_fault": { "type": "STRING" },
                    "confidence": { "type": "NUMBER" }
                },
                "required": ["likely_fault", "confidence"]
            },
            "recommended_action": { "type": "STRING" }
        },
        "required": [
            "severity_score",
            "estimated_cost",
            "parts_damaged",
            "fault_analysis",
            "recommended_action"
        ]
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Default, Deserialize)]
struct TextPart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .iter()
            .find_map(|p| p.text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Parse the model's JSON reply, tolerating a markdown code fence
fn parse_assessment(text: &str) -> Result<DamageAssessment> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    let assessment: DamageAssessment = serde_json::from_str(body.trim())?;
    Ok(assessment.normalized())
}

fn request_body(parts: Vec<Value>) -> Value {
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

fn inline_image(mime_type: &str, bytes: &[u8]) -> Value {
    json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": STANDARD.encode(bytes)
        }
    })
}

async fn photo_part(photo: &Photo) -> Result<Value> {
    let bytes = tokio::fs::read(&photo.path).await?;
    Ok(inline_image(&photo.mime_type, &bytes))
}

/// Client for the generative language API
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AssessmentConfig, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("CrashDoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate(&self, parts: Vec<Value>) -> Result<DamageAssessment> {
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(parts))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrashDocError::AssessmentHttp(status.as_u16()));
        }

        let reply: GenerateResponse = response.json().await?;
        let text = reply.text().ok_or(CrashDocError::EmptyAssessment)?;
        debug!("Assessment reply: {} bytes", text.len());
        parse_assessment(text)
    }
}

#[async_trait]
impl AssessmentService for GeminiClient {
    async fn assess_all(&self, photos: &[Photo]) -> Result<DamageAssessment> {
        if photos.is_empty() {
            return Err(CrashDocError::NoPhotos);
        }
        let mut parts = Vec::with_capacity(photos.len() + 1);
        for photo in photos {
            parts.push(photo_part(photo).await?);
        }
        parts.push(json!({ "text": multi_photo_prompt(photos.len()) }));
        self.generate(parts).await
    }

    async fn assess_one(&self, photo: &Photo) -> Result<DamageAssessment> {
        let parts = vec![photo_part(photo).await?, json!({ "text": SINGLE_PHOTO_PROMPT })];
        self.generate(parts).await
    }
}
