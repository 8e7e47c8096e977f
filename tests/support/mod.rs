#![allow(dead_code)]

use async_trait::async_trait;
use claimwatch::oracle::{MockOracle, Oracle};
use claimwatch::pipeline::{PipelineEvent, PipelineObserver};
use claimwatch::settings::{KeyValueStore, MemoryStore, SimSpeed};
use claimwatch::types::RunSignals;
use claimwatch::{Session, Verdict, VerdictRecord};
use std::sync::{Arc, Mutex};

/// Always answers with the same verdict, confidence and signals.
pub struct FixedOracle {
    pub verdict: Verdict,
    pub confidence: f64,
    pub signals: RunSignals,
}

impl FixedOracle {
    pub fn new(verdict: Verdict, confidence: f64) -> Self {
        Self {
            verdict,
            confidence,
            signals: RunSignals { bot_percentage: 40, coord_score: 0.75, engagement_spike: 320 },
        }
    }
}

impl Oracle for FixedOracle {
    fn next_verdict(&mut self, _counter: u64) -> VerdictRecord {
        let mut record = MockOracle::canned(self.verdict);
        record.confidence = self.confidence;
        record
    }

    fn draw_signals(&mut self, _record: &VerdictRecord) -> RunSignals {
        self.signals
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn taken(&self) -> Vec<PipelineEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[async_trait]
impl PipelineObserver for RecordingObserver {
    async fn on_event(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Fast-speed session over a fixed oracle, returning the observer for inspection.
pub fn fixed_session(verdict: Verdict, confidence: f64) -> (Session, Arc<RecordingObserver>) {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let observer = Arc::new(RecordingObserver::default());
    let session = Session::with_oracle(store, Box::new(FixedOracle::new(verdict, confidence)), observer.clone(), Some(5));
    session.set_sim_speed(SimSpeed::Fast);
    (session, observer)
}

pub const CLAIM: &str = "Viral video shows flooded metro station in Delhi";
