//! Scripted misinformation-triage workflow.
//!
//! A claim goes through five timed stages (detection, cluster, verification,
//! response, audit) fed by a synthetic [`oracle::Oracle`]. Completed runs land
//! in a bounded [`history::HistoryStore`], drive an animated coordination
//! graph, and can be exported as a PDF report or a CSV table.

pub mod error;
pub mod export;
pub mod graph;
pub mod history;
pub mod oracle;
pub mod pipeline;
pub mod response;
pub mod segments;
pub mod session;
pub mod settings;
pub mod simulator;
pub mod types;
pub mod workflow;

pub use error::{ExportError, PipelineError, StorageError};
pub use session::{Notice, NoticeLevel, Session};
pub use types::{AnalysisResult, Stage, StageStatus, Verdict, VerdictRecord};
