//! Application state owned by one front end: settings, history, the run
//! choreographer and the live coordination graph.

use crate::error::{ExportError, ExportResult, PipelineError, PipelineResult};
use crate::export::{export_all_as_table, export_latest_as_document, report_filename, table_filename, write_export};
use crate::graph::{AnimationHandle, CanvasSize, Frame, GraphCaption, GraphSimulator, NodeCounts, TOTAL_NODES};
use crate::history::{HistoryStore, SortKey, SortOrder};
use crate::oracle::{MockOracle, Oracle};
use crate::pipeline::{Choreographer, PipelineObserver};
use crate::settings::{load_settings, save_settings, KeyValueStore, Settings, SimSpeed, MAX_FEEDBACK_RATING};
use crate::simulator::{SimulationPlan, SimulationReport};
use crate::types::{AnalysisResult, PipelineStageState};
use crate::workflow::WorkflowView;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel { Success, Info, Warning, Error }

/// Transient user-facing message (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self { Self { level, message: message.into() } }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

impl From<&PipelineError> for Notice {
    fn from(e: &PipelineError) -> Self {
        match e {
            PipelineError::Validation { min, .. } => Notice::new(NoticeLevel::Error, format!("Please enter at least {min} characters")),
            PipelineError::Concurrency => Notice::new(NoticeLevel::Warning, "Analysis already in progress"),
        }
    }
}

impl From<&ExportError> for Notice {
    fn from(e: &ExportError) -> Self {
        match e {
            ExportError::EmptyHistory => Notice::new(NoticeLevel::Warning, "No analysis data to export"),
            other => Notice::new(NoticeLevel::Error, other.to_string()),
        }
    }
}

pub struct Session {
    choreographer: Choreographer,
    history: Mutex<HistoryStore>,
    settings: Mutex<Settings>,
    store: Arc<dyn KeyValueStore>,
    graph: GraphSimulator,
    animation: Mutex<Option<AnimationHandle>>,
    rng: Mutex<StdRng>,
    canvas: CanvasSize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|e| e.into_inner()) }

impl Session {
    /// Session over the stock oracle, seeded when `seed` is given.
    pub fn new(store: Arc<dyn KeyValueStore>, observer: Arc<dyn PipelineObserver>, seed: Option<u64>) -> Self {
        let oracle = Box::new(MockOracle::new(seed));
        Self::with_oracle(store, oracle, observer, seed.map(|s| s.wrapping_add(1)))
    }

    pub fn with_oracle(
        store: Arc<dyn KeyValueStore>,
        oracle: Box<dyn Oracle>,
        observer: Arc<dyn PipelineObserver>,
        seed: Option<u64>,
    ) -> Self {
        let settings = load_settings(store.as_ref());
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            choreographer: Choreographer::new(oracle, observer),
            history: Mutex::new(HistoryStore::new()),
            settings: Mutex::new(settings),
            store,
            graph: GraphSimulator::default(),
            animation: Mutex::new(None),
            rng: Mutex::new(rng),
            canvas: CanvasSize::default(),
        }
    }

    pub fn settings(&self) -> Settings { *lock(&self.settings) }

    fn update_settings(&self, f: impl FnOnce(&mut Settings)) -> Settings {
        let snapshot = {
            let mut s = lock(&self.settings);
            f(&mut s);
            *s
        };
        save_settings(self.store.as_ref(), &snapshot);
        snapshot
    }

    pub fn set_sim_speed(&self, speed: SimSpeed) -> Settings { self.update_settings(|s| s.sim_speed = speed) }

    pub fn set_auto_sim(&self, on: bool) -> Settings { self.update_settings(|s| s.auto_sim = on) }

    pub fn set_feedback_rating(&self, rating: u8) -> Settings {
        self.update_settings(|s| s.feedback_rating = rating.min(MAX_FEEDBACK_RATING))
    }

    pub fn analysis_count(&self) -> u64 { self.choreographer.analysis_count() }

    pub fn is_running(&self) -> bool { self.choreographer.is_running() }

    pub fn stages(&self) -> Vec<PipelineStageState> { self.choreographer.stages() }

    /// Runs the pipeline; on success records the result and restarts the graph.
    pub async fn analyze(&self, claim: &str) -> PipelineResult<AnalysisResult> {
        let speed = self.settings().sim_speed;
        let run = match self.choreographer.run(claim, speed).await {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "analysis rejected");
                return Err(e);
            }
        };

        let counts = NodeCounts::from_signals(run.signals.bot_percentage, run.signals.coord_score);
        let caption = GraphCaption {
            total_accounts: TOTAL_NODES,
            bot_percentage: run.signals.bot_percentage,
            coord_score: run.signals.coord_score,
        };

        let result = {
            let mut history = lock(&self.history);
            let id = history.allocate_id();
            let result = run.into_result(id);
            history.insert(result.clone());
            result
        };
        info!(id = result.id, verdict = %result.verdict, "analysis recorded");

        let handle = {
            let mut rng = lock(&self.rng);
            self.graph.render(counts, self.canvas, caption, &mut *rng)
        };
        *lock(&self.animation) = Some(handle);
        Ok(result)
    }

    pub fn history_count(&self) -> usize { lock(&self.history).count() }

    pub fn history(&self) -> Vec<AnalysisResult> { lock(&self.history).iter().cloned().collect() }

    pub fn search(&self, query: &str) -> Vec<AnalysisResult> {
        lock(&self.history).list_matching(query).into_iter().cloned().collect()
    }

    pub fn sorted_history(&self, key: SortKey, order: SortOrder) -> Vec<AnalysisResult> {
        lock(&self.history).sorted(key, order).into_iter().cloned().collect()
    }

    pub fn view(&self, id: u64) -> Option<AnalysisResult> { lock(&self.history).get(id).cloned() }

    pub fn delete(&self, id: u64) -> bool {
        let removed = lock(&self.history).delete_by_id(id);
        info!(id, removed, "history delete");
        removed
    }

    pub fn reset_history(&self) {
        lock(&self.history).clear();
        info!("history reset");
    }

    pub fn latest(&self) -> Option<AnalysisResult> { lock(&self.history).latest().cloned() }

    pub fn workflow(&self) -> Option<WorkflowView> {
        let latest = self.latest()?;
        let mut rng = lock(&self.rng);
        Some(WorkflowView::build(&latest, &mut *rng))
    }

    pub fn graph_frame(&self) -> Option<Frame> { lock(&self.animation).as_ref().map(|h| h.latest()) }

    pub fn graph_animation_id(&self) -> Option<u64> { self.graph.active_id() }

    pub fn stop_graph(&self) {
        if let Some(handle) = lock(&self.animation).take() {
            self.graph.stop(&handle);
        }
    }

    /// `(filename, pdf bytes)` for the newest entry.
    pub fn export_report(&self, now: DateTime<Utc>) -> ExportResult<(String, Vec<u8>)> {
        let history = lock(&self.history);
        let bytes = export_latest_as_document(&history, now)?;
        let id = history.latest().map(|e| e.id).ok_or(ExportError::EmptyHistory)?;
        Ok((report_filename(id, now), bytes))
    }

    /// `(filename, csv text)` for the whole history.
    pub fn export_table(&self, now: DateTime<Utc>) -> ExportResult<(String, String)> {
        let csv = export_all_as_table(&lock(&self.history))?;
        Ok((table_filename(now), csv))
    }

    /// Renders the report and writes it under `dir`. History is checked
    /// before anything touches the filesystem.
    pub async fn save_report(&self, dir: &Path, now: DateTime<Utc>) -> ExportResult<PathBuf> {
        let (name, bytes) = self.export_report(now)?;
        write_export(dir, &name, &bytes).await
    }

    pub async fn save_table(&self, dir: &Path, now: DateTime<Utc>) -> ExportResult<PathBuf> {
        let (name, csv) = self.export_table(now)?;
        write_export(dir, &name, csv.as_bytes()).await
    }

    pub async fn simulate<F: FnMut(&str)>(&self, keyword: &str, on_line: F) -> SimulationReport {
        let plan = {
            let mut rng = lock(&self.rng);
            SimulationPlan::draw(keyword, &mut *rng)
        };
        plan.play(self.settings().sim_speed, on_line).await
    }

    pub fn sample_claim(&self) -> &'static str {
        let mut rng = lock(&self.rng);
        crate::simulator::sample_claim(&mut *rng)
    }
}

/// Analyses started in the background by an interactive front end.
///
/// Runs are never cancelled; [`BackgroundRuns::finish`] waits for every one of
/// them, so leaving the front end does not drop a run mid-stage.
#[derive(Default)]
pub struct BackgroundRuns {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundRuns {
    /// Starts `claim` on its own task and hands the outcome to `on_done`.
    /// A second run while one is active is rejected by the session's guard.
    pub fn spawn<F>(&mut self, session: &Arc<Session>, claim: String, on_done: F)
    where
        F: FnOnce(PipelineResult<AnalysisResult>) + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        let session = Arc::clone(session);
        self.tasks.push(tokio::spawn(async move { on_done(session.analyze(&claim).await) }));
    }

    pub fn pending(&self) -> usize { self.tasks.iter().filter(|t| !t.is_finished()).count() }

    pub async fn finish(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background analysis task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NullObserver;
    use crate::settings::MemoryStore;

    fn session(store: Arc<MemoryStore>) -> Session { Session::new(store, Arc::new(NullObserver), Some(17)) }

    #[test]
    fn settings_changes_are_persisted() {
        let store = Arc::new(MemoryStore::new());
        let s = session(store.clone());
        s.set_sim_speed(SimSpeed::Fast);
        s.set_auto_sim(false);
        s.set_feedback_rating(9);
        let fresh = session(store);
        let loaded = fresh.settings();
        assert_eq!(loaded, Settings { auto_sim: false, sim_speed: SimSpeed::Fast, feedback_rating: MAX_FEEDBACK_RATING });
    }

    #[test]
    fn notices_map_error_kinds() {
        let n = Notice::from(&PipelineError::Concurrency);
        assert_eq!(n.level, NoticeLevel::Warning);
        let n = Notice::from(&ExportError::EmptyHistory);
        assert_eq!(n.message, "No analysis data to export");
        let n = Notice::from(&PipelineError::Validation { len: 3, min: 10 });
        assert_eq!(n.to_string(), "[error] Please enter at least 10 characters");
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_records_history_and_starts_graph() {
        let s = session(Arc::new(MemoryStore::new()));
        s.set_sim_speed(SimSpeed::Fast);
        let r = s.analyze("Mumbai Bridge Collapse: 50+ feared dead").await.unwrap();
        assert_eq!(r.id, 1);
        assert_eq!(s.history_count(), 1);
        assert!(s.graph_animation_id().is_some());
        let frame = s.graph_frame().unwrap();
        assert_eq!(frame.caption.bot_percentage, r.detailed_analysis.bot_percentage);
        assert!(s.workflow().is_some());
        s.stop_graph();
        assert!(s.graph_animation_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn background_runs_finish_before_shutdown() {
        let s = Arc::new(session(Arc::new(MemoryStore::new())));
        s.set_sim_speed(SimSpeed::Fast);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut runs = BackgroundRuns::default();
        for claim in ["Mumbai Bridge Collapse: 50+ feared dead", "Second claim typed while busy"] {
            let tx = tx.clone();
            runs.spawn(&s, claim.to_string(), move |r| {
                let _ = tx.send(r.map(|r| r.id));
            });
        }
        assert_eq!(runs.pending(), 2);
        runs.finish().await;

        assert_eq!(s.history_count(), 1);
        assert!(!s.is_running());
        let mut outcomes = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        outcomes.sort_by_key(|o| o.is_err());
        assert_eq!(outcomes, vec![Ok(1), Err(PipelineError::Concurrency)]);
        s.stop_graph();
    }

    #[tokio::test(start_paused = true)]
    async fn exports_name_files_after_latest_entry() {
        let s = session(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        assert!(matches!(s.export_report(now), Err(ExportError::EmptyHistory)));
        s.set_sim_speed(SimSpeed::Fast);
        s.analyze("A claim about a viral photo of floods").await.unwrap();
        let (name, bytes) = s.export_report(now).unwrap();
        assert!(name.starts_with("claimwatch-report-1-"));
        assert!(bytes.starts_with(b"%PDF"));
        let (name, csv) = s.export_table(now).unwrap();
        assert!(name.ends_with(".csv"));
        assert_eq!(csv.lines().count(), 2);
    }
}
