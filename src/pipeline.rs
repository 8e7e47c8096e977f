//! Five-stage run choreography: detection, cluster, verification, response, audit.
//!
//! A run is strictly linear. Each stage goes idle -> active -> complete and every
//! transition is pushed to a [`PipelineObserver`]. Only one run may be in flight;
//! a second request is rejected, not queued.

use crate::error::{PipelineError, PipelineResult};
use crate::oracle::Oracle;
use crate::response::draft_response;
use crate::segments::{normalize, truncate_graphemes};
use crate::settings::SimSpeed;
use crate::types::{
    confidence_percent, AnalysisResult, DetailedAnalysis, PipelineStageState, RunSignals, Stage, StageStatus,
    VerdictRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info};

pub const MIN_CLAIM_LEN: usize = 10;
pub const AUDIT_DELAY: Duration = Duration::from_millis(500);
pub const REVIEW_DELAY: Duration = Duration::from_millis(500);
pub const REVIEW_THRESHOLD: f64 = 0.6;
pub const PROCESSING_TIME: &str = "< 30 seconds";
const OCR_KEYWORDS: [&str; 2] = ["image", "photo"];
const OCR_MESSAGE: &str = "OCR Analysis: Image metadata suggests manipulation";
const DRAFT_PREVIEW_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState { Idle, Detection, Cluster, Verification, Response, Audit, Done }

impl RunState {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunState::Detection => Some(Stage::Detection),
            RunState::Cluster => Some(Stage::Cluster),
            RunState::Verification => Some(Stage::Verification),
            RunState::Response => Some(Stage::Response),
            RunState::Audit => Some(Stage::Audit),
            RunState::Idle | RunState::Done => None,
        }
    }

    pub fn next(&self) -> RunState {
        match self {
            RunState::Idle => RunState::Detection,
            RunState::Detection => RunState::Cluster,
            RunState::Cluster => RunState::Verification,
            RunState::Verification => RunState::Response,
            RunState::Response => RunState::Audit,
            RunState::Audit | RunState::Done => RunState::Done,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started { claim: String },
    StageActive { stage: Stage, line: String },
    StageOutput { stage: Stage, text: String },
    StageComplete { stage: Stage },
    CoordinationScore(f64),
    Completed { verdict: crate::types::Verdict, confidence: f64 },
    HumanReviewRecommended { confidence: f64 },
}

#[async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn on_event(&self, event: PipelineEvent);
}

pub struct NullObserver;

#[async_trait]
impl PipelineObserver for NullObserver {
    async fn on_event(&self, _event: PipelineEvent) {}
}

/// Forwards events into an unbounded channel. A closed receiver is ignored.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PipelineObserver for ChannelObserver {
    async fn on_event(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// A finished run, before it is given a history id.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub claim: String,
    pub record: VerdictRecord,
    pub signals: RunSignals,
    pub details: DetailedAnalysis,
    pub finished_at: DateTime<Utc>,
}

impl CompletedRun {
    pub fn into_result(self, id: u64) -> AnalysisResult {
        AnalysisResult {
            id,
            claim: self.claim,
            verdict: self.record.verdict,
            confidence: self.record.confidence,
            explanation: self.record.explanation,
            timestamp: self.finished_at,
            detailed_analysis: self.details,
        }
    }
}

/// Clears the in-flight flag on every exit path, including a dropped future.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> PipelineResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunGuard(flag))
            .map_err(|_| PipelineError::Concurrency)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

struct Board {
    state: RunState,
    stages: Vec<PipelineStageState>,
}

impl Board {
    fn idle() -> Self {
        Self { state: RunState::Idle, stages: Stage::ORDER.iter().map(|s| PipelineStageState::idle(*s)).collect() }
    }

    fn slot(&mut self, stage: Stage) -> Option<&mut PipelineStageState> {
        self.stages.iter_mut().find(|s| s.stage == stage)
    }
}

pub struct Choreographer {
    oracle: Mutex<Box<dyn Oracle>>,
    counter: AtomicU64,
    running: AtomicBool,
    board: Mutex<Board>,
    observer: Arc<dyn PipelineObserver>,
}

impl Choreographer {
    pub fn new(oracle: Box<dyn Oracle>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            oracle: Mutex::new(oracle),
            counter: AtomicU64::new(0),
            running: AtomicBool::new(false),
            board: Mutex::new(Board::idle()),
            observer,
        }
    }

    /// Number of successful runs so far; selects the next oracle pattern slot.
    pub fn analysis_count(&self) -> u64 { self.counter.load(Ordering::Acquire) }

    pub fn is_running(&self) -> bool { self.running.load(Ordering::Acquire) }

    pub fn state(&self) -> RunState { self.board().state }

    pub fn stages(&self) -> Vec<PipelineStageState> { self.board().stages.clone() }

    fn board(&self) -> MutexGuard<'_, Board> { self.board.lock().unwrap_or_else(|e| e.into_inner()) }

    pub async fn run(&self, claim: &str, speed: SimSpeed) -> PipelineResult<CompletedRun> {
        let claim = claim.trim();
        let len = claim.chars().count();
        if len < MIN_CLAIM_LEN {
            return Err(PipelineError::Validation { len, min: MIN_CLAIM_LEN });
        }
        let _guard = RunGuard::acquire(&self.running)?;

        let counter = self.analysis_count();
        let (record, signals) = {
            let mut oracle = self.oracle.lock().unwrap_or_else(|e| e.into_inner());
            let record = oracle.next_verdict(counter);
            let signals = oracle.draw_signals(&record);
            (record, signals)
        };
        info!(counter, verdict = %record.verdict, confidence = record.confidence, "pipeline run started");

        *self.board() = Board::idle();
        self.emit(PipelineEvent::Started { claim: claim.to_string() }).await;

        let delay = speed.stage_delay();
        let mut state = RunState::Idle.next();
        let mut texts: Vec<String> = Vec::with_capacity(Stage::ORDER.len());
        let mut draft = String::new();

        while let Some(stage) = state.stage() {
            self.board().state = state;
            self.transition(stage, StageStatus::Active, stage.initial_line()).await;

            let text = match stage {
                Stage::Detection => format!("Engagement spike detected: {}% increase in 15 min", signals.engagement_spike),
                Stage::Cluster => format!("Bot network: {}% | Coordination: {:.2}", signals.bot_percentage, signals.coord_score),
                Stage::Verification => verification_text(claim, &record),
                Stage::Response => {
                    draft = draft_response(claim, record.verdict, Utc::now());
                    format!("Draft ready: \"{}...\"", truncate_graphemes(&draft, DRAFT_PREVIEW_LEN))
                }
                Stage::Audit => format!(
                    "Logged: {} | Confidence: {}",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    record.confidence
                ),
            };

            if stage == Stage::Audit {
                self.output(stage, &text).await;
                sleep(AUDIT_DELAY).await;
            } else {
                sleep(delay).await;
                self.output(stage, &text).await;
                sleep(delay).await;
            }

            self.transition(stage, StageStatus::Complete, &text).await;
            if stage == Stage::Cluster {
                self.emit(PipelineEvent::CoordinationScore(signals.coord_score)).await;
            }
            texts.push(text);
            state = state.next();
        }
        self.board().state = RunState::Done;

        let details = DetailedAnalysis {
            detection: texts[0].clone(),
            cluster: texts[1].clone(),
            verification: texts[2].clone(),
            response: draft,
            audit: texts[4].clone(),
            bot_percentage: signals.bot_percentage,
            cib_score: signals.coord_score,
            engagement_spike: signals.engagement_spike,
            sources_checked: record.sources.clone(),
            processing_time: PROCESSING_TIME.to_string(),
        };

        self.counter.fetch_add(1, Ordering::AcqRel);
        self.emit(PipelineEvent::Completed { verdict: record.verdict, confidence: record.confidence }).await;
        if record.confidence < REVIEW_THRESHOLD {
            self.schedule_review_notice(record.confidence);
        }
        info!(verdict = %record.verdict, "pipeline run complete");

        Ok(CompletedRun { claim: claim.to_string(), record, signals, details, finished_at: Utc::now() })
    }

    async fn transition(&self, stage: Stage, status: StageStatus, text: &str) {
        if let Some(slot) = self.board().slot(stage) {
            slot.status = status;
            slot.output_text = text.to_string();
        }
        debug!(%stage, ?status, "stage transition");
        let event = match status {
            StageStatus::Active => PipelineEvent::StageActive { stage, line: text.to_string() },
            _ => PipelineEvent::StageComplete { stage },
        };
        self.emit(event).await;
    }

    async fn output(&self, stage: Stage, text: &str) {
        if let Some(slot) = self.board().slot(stage) {
            slot.output_text = text.to_string();
        }
        self.emit(PipelineEvent::StageOutput { stage, text: text.to_string() }).await;
    }

    async fn emit(&self, event: PipelineEvent) { self.observer.on_event(event).await; }

    fn schedule_review_notice(&self, confidence: f64) {
        let observer = Arc::clone(&self.observer);
        tokio::spawn(async move {
            sleep(REVIEW_DELAY).await;
            observer.on_event(PipelineEvent::HumanReviewRecommended { confidence }).await;
        });
    }
}

fn verification_text(claim: &str, record: &VerdictRecord) -> String {
    let norm = normalize(claim);
    if OCR_KEYWORDS.iter().any(|k| norm.contains(k)) {
        OCR_MESSAGE.to_string()
    } else {
        format!("Verdict: {} ({}%)", record.verdict.label(), confidence_percent(record.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::types::Verdict;

    struct Fixed(Verdict, f64);

    impl Oracle for Fixed {
        fn next_verdict(&mut self, _counter: u64) -> VerdictRecord {
            let mut r = MockOracle::canned(self.0);
            r.confidence = self.1;
            r
        }
        fn draw_signals(&mut self, _record: &VerdictRecord) -> RunSignals {
            RunSignals { bot_percentage: 30, coord_score: 0.8, engagement_spike: 345 }
        }
    }

    fn choreographer(v: Verdict, c: f64) -> (Choreographer, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (obs, rx) = ChannelObserver::new();
        (Choreographer::new(Box::new(Fixed(v, c)), Arc::new(obs)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() { out.push(e); }
        out
    }

    #[test]
    fn run_state_is_linear() {
        let mut s = RunState::Idle;
        let mut seen = Vec::new();
        while s != RunState::Done {
            s = s.next();
            if let Some(stage) = s.stage() { seen.push(stage); }
        }
        assert_eq!(seen, Stage::ORDER);
        assert_eq!(RunState::Done.next(), RunState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn short_claim_is_rejected_without_side_effects() {
        let (ch, mut rx) = choreographer(Verdict::False, 0.87);
        let err = ch.run("too short", SimSpeed::Fast).await.unwrap_err();
        assert_eq!(err, PipelineError::Validation { len: 9, min: MIN_CLAIM_LEN });
        assert_eq!(ch.analysis_count(), 0);
        assert!(!ch.is_running());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stages_complete_in_order_with_expected_texts() {
        let (ch, mut rx) = choreographer(Verdict::False, 0.87);
        let run = ch.run("Mumbai Bridge Collapse: 50+ feared dead", SimSpeed::Medium).await.unwrap();

        let events = drain(&mut rx);
        let completed: Vec<Stage> = events.iter().filter_map(|e| match e {
            PipelineEvent::StageComplete { stage } => Some(*stage),
            _ => None,
        }).collect();
        assert_eq!(completed, Stage::ORDER);

        let cluster_done = events.iter().position(|e| *e == PipelineEvent::StageComplete { stage: Stage::Cluster }).unwrap();
        assert_eq!(events[cluster_done + 1], PipelineEvent::CoordinationScore(0.8));

        assert_eq!(run.details.detection, "Engagement spike detected: 345% increase in 15 min");
        assert_eq!(run.details.cluster, "Bot network: 30% | Coordination: 0.80");
        assert_eq!(run.details.verification, "Verdict: FALSE (87%)");
        assert!(run.details.response.contains("FALSE"));
        assert!(run.details.audit.ends_with("| Confidence: 0.87"));
        assert_eq!(ch.analysis_count(), 1);
        assert_eq!(ch.state(), RunState::Done);
        assert!(ch.stages().iter().all(|s| s.status == StageStatus::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn photo_claims_get_ocr_message() {
        let (ch, _rx) = choreographer(Verdict::True, 0.9);
        let run = ch.run("Viral PHOTO shows flooded airport", SimSpeed::Fast).await.unwrap();
        assert_eq!(run.details.verification, OCR_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_timing_follows_speed() {
        let (ch, _rx) = choreographer(Verdict::True, 0.9);
        let start = tokio::time::Instant::now();
        ch.run("A sufficiently long claim", SimSpeed::Slow).await.unwrap();
        // four timed stages suspend twice, audit once at a fixed delay
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4 * 2 * 2000 + 500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(4 * 2 * 2000 + 520), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_while_active_is_rejected() {
        let (ch, _rx) = choreographer(Verdict::True, 0.9);
        let (a, b) = tokio::join!(
            ch.run("First claim under review", SimSpeed::Fast),
            async {
                tokio::task::yield_now().await;
                ch.run("Second claim under review", SimSpeed::Fast).await
            }
        );
        assert!(a.is_ok());
        assert_eq!(b.unwrap_err(), PipelineError::Concurrency);
        assert_eq!(ch.analysis_count(), 1);
        assert!(!ch.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_run_releases_guard_and_keeps_counter() {
        let (ch, _rx) = choreographer(Verdict::True, 0.9);
        let res = tokio::time::timeout(Duration::from_millis(100), ch.run("Claim that gets abandoned", SimSpeed::Fast)).await;
        assert!(res.is_err());
        assert!(!ch.is_running());
        assert_eq!(ch.analysis_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn low_confidence_schedules_review_notice() {
        let (ch, mut rx) = choreographer(Verdict::Unverified, 0.55);
        ch.run("Unclear claim about a festival", SimSpeed::Fast).await.unwrap();
        assert!(!drain(&mut rx).iter().any(|e| matches!(e, PipelineEvent::HumanReviewRecommended { .. })));
        sleep(REVIEW_DELAY + Duration::from_millis(1)).await;
        assert_eq!(drain(&mut rx), vec![PipelineEvent::HumanReviewRecommended { confidence: 0.55 }]);
    }
}
