use crate::types::AnalysisResult;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::debug;

pub const HISTORY_CAPACITY: usize = 50;

/// Display timezone for timestamps (IST, UTC+05:30).
const DISPLAY_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Short date/time as shown in the history table and reports.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    const FMT: &str = "%d/%m/%y, %-I:%M %P";
    match FixedOffset::east_opt(DISPLAY_OFFSET_SECS) {
        Some(tz) => at.with_timezone(&tz).format(FMT).to_string(),
        None => at.format(FMT).to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey { Id, Claim, Verdict, Confidence, Timestamp }

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(SortKey::Id),
            "claim" => Ok(SortKey::Claim),
            "verdict" => Ok(SortKey::Verdict),
            "confidence" => Ok(SortKey::Confidence),
            "timestamp" | "time" => Ok(SortKey::Timestamp),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder { #[default] Ascending, Descending }

/// Bounded list of completed analyses, newest first.
///
/// Ids come from [`HistoryStore::allocate_id`] and are never handed out twice,
/// even after deletion or [`HistoryStore::clear`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: VecDeque<AnalysisResult>,
    capacity: usize,
    next_id: u64,
}

impl Default for HistoryStore {
    fn default() -> Self { Self::with_capacity(HISTORY_CAPACITY) }
}

impl HistoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity + 1), capacity: capacity.max(1), next_id: 1 }
    }

    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Prepends `result`. Returns the evicted oldest entry on overflow.
    pub fn insert(&mut self, result: AnalysisResult) -> Option<AnalysisResult> {
        self.next_id = self.next_id.max(result.id + 1);
        debug!(id = result.id, "history insert");
        self.entries.push_front(result);
        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_back();
            if let Some(e) = &evicted { debug!(id = e.id, "history evict"); }
            return evicted;
        }
        None
    }

    /// Case-insensitive substring match over each rendered row, in stored order.
    pub fn list_matching(&self, query: &str) -> Vec<&AnalysisResult> {
        let q = query.to_lowercase();
        self.entries.iter().filter(|e| row_text(e).to_lowercase().contains(&q)).collect()
    }

    /// Removes at most one entry. Returns whether anything was removed.
    pub fn delete_by_id(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(pos) => { self.entries.remove(pos); true }
            None => false,
        }
    }

    pub fn count(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn latest(&self) -> Option<&AnalysisResult> { self.entries.front() }

    pub fn get(&self, id: u64) -> Option<&AnalysisResult> { self.entries.iter().find(|e| e.id == id) }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisResult> { self.entries.iter() }

    pub fn clear(&mut self) { self.entries.clear(); }

    /// Sorted view. Stored recency order is left untouched.
    pub fn sorted(&self, key: SortKey, order: SortOrder) -> Vec<&AnalysisResult> {
        let mut view: Vec<&AnalysisResult> = self.entries.iter().collect();
        view.sort_by(|a, b| {
            let ord = match key {
                SortKey::Id => a.id.cmp(&b.id),
                SortKey::Claim => a.claim.to_lowercase().cmp(&b.claim.to_lowercase()),
                SortKey::Verdict => a.verdict.as_str().cmp(b.verdict.as_str()),
                SortKey::Confidence => a.confidence.partial_cmp(&b.confidence).unwrap_or(Ordering::Equal),
                SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
            }
            .then_with(|| a.id.cmp(&b.id));
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        view
    }
}

/// Text of a history row: id, claim, verdict, confidence and formatted time.
pub fn row_text(entry: &AnalysisResult) -> String {
    format!(
        "{} {} {} {}% {}",
        entry.id,
        entry.claim,
        entry.verdict.label(),
        entry.confidence_percent(),
        format_timestamp(&entry.timestamp)
    )
}
