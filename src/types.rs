use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict { False, True, Unverified, Mixed }

impl Verdict {
    pub const ALL: [Verdict; 4] = [Verdict::False, Verdict::True, Verdict::Unverified, Verdict::Mixed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::False => "false",
            Verdict::True => "true",
            Verdict::Unverified => "unverified",
            Verdict::Mixed => "mixed",
        }
    }

    pub fn label(&self) -> String { self.as_str().to_uppercase() }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Canned oracle output. Never mutated once handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub verdict: Verdict,
    pub confidence: f64,                 // [0.5, 0.99], two decimals
    pub explanation: String,
    pub sources: Vec<String>,
    pub bot_percentage_range: (f64, f64),
    pub coord_score_range: (f64, f64),
}

/// Values the caller draws from a record's ranges for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSignals {
    pub bot_percentage: u32,
    pub coord_score: f64,                // two decimals
    pub engagement_spike: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage { Detection, Cluster, Verification, Response, Audit }

impl Stage {
    pub const ORDER: [Stage; 5] = [Stage::Detection, Stage::Cluster, Stage::Verification, Stage::Response, Stage::Audit];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Detection => "detection",
            Stage::Cluster => "cluster",
            Stage::Verification => "verification",
            Stage::Response => "response",
            Stage::Audit => "audit",
        }
    }

    /// Progress line shown while the stage is working.
    pub fn initial_line(&self) -> &'static str {
        match self {
            Stage::Detection => "Scanning social media platforms...",
            Stage::Cluster => "Analyzing network patterns...",
            Stage::Verification => "Cross-referencing databases...",
            Stage::Response => "Generating counter-narrative...",
            Stage::Audit => "Logging decision...",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Detection => "Detection Agent",
            Stage::Cluster => "Cluster Agent",
            Stage::Verification => "Verification Agent",
            Stage::Response => "Response Agent",
            Stage::Audit => "Audit Agent",
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            Stage::Detection => "Monitor social media platforms for viral claims",
            Stage::Cluster => "Analyze network patterns and identify bot behavior",
            Stage::Verification => "Cross-reference with authoritative databases",
            Stage::Response => "Generate context-aware counter-narratives",
            Stage::Audit => "Log all decisions and maintain transparency records",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus { Idle, Active, Complete }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageState {
    pub stage: Stage,
    pub status: StageStatus,
    pub output_text: String,
}

impl PipelineStageState {
    pub fn idle(stage: Stage) -> Self { Self { stage, status: StageStatus::Idle, output_text: String::new() } }
}

/// Per-stage summaries kept with a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub detection: String,
    pub cluster: String,
    pub verification: String,
    pub response: String,               // full draft, not the truncated stage line
    pub audit: String,
    pub bot_percentage: u32,
    pub cib_score: f64,
    pub engagement_spike: u32,
    pub sources_checked: Vec<String>,
    pub processing_time: String,
}

impl DetailedAnalysis {
    pub fn stage_summary(&self, stage: Stage) -> &str {
        match stage {
            Stage::Detection => &self.detection,
            Stage::Cluster => &self.cluster,
            Stage::Verification => &self.verification,
            Stage::Response => &self.response,
            Stage::Audit => &self.audit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: u64,
    pub claim: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub explanation: String,
    pub timestamp: DateTime<Utc>,
    pub detailed_analysis: DetailedAnalysis,
}

impl AnalysisResult {
    pub fn confidence_percent(&self) -> u32 { confidence_percent(self.confidence) }

    pub fn needs_human_review(&self) -> bool { self.confidence < crate::pipeline::REVIEW_THRESHOLD }
}

/// Whole percent, floored, as shown everywhere a confidence is displayed.
pub fn confidence_percent(confidence: f64) -> u32 { (confidence * 100.0 + 1e-9).floor() as u32 }

/// Rounds to two decimal places.
pub fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }
