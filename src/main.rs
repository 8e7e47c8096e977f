use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use claimwatch::history::{format_timestamp, SortKey, SortOrder};
use claimwatch::pipeline::{PipelineEvent, PipelineObserver, REVIEW_DELAY};
use claimwatch::segments::ellipsize;
use claimwatch::settings::{FileStore, SimSpeed};
use claimwatch::error::ExportResult;
use claimwatch::session::BackgroundRuns;
use claimwatch::{AnalysisResult, Notice, NoticeLevel, Session};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "claimwatch", version, about = "Scripted misinformation-triage pipeline")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// Where settings and exports are written
    #[arg(long, default_value = "./data", global = true)]
    data_dir: PathBuf,
    /// Fix every random draw
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one claim through the pipeline and print the verdict
    Analyze {
        claim: String,
        /// Also write the PDF report and CSV history
        #[arg(long)]
        export: bool,
    },
    /// Console walkthrough for a keyword (random sample claim when omitted)
    Simulate { keyword: Option<String> },
    /// Show or change persisted settings
    Settings {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        speed: Option<u8>,
        #[arg(long)]
        auto_sim: Option<bool>,
        #[arg(long)]
        rating: Option<u8>,
    },
    /// Interactive dashboard
    Shell,
}

/// Prints stage transitions as they happen.
struct ConsoleObserver;

#[async_trait]
impl PipelineObserver for ConsoleObserver {
    async fn on_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Started { claim } => println!("> analyzing: {}", ellipsize(&claim, 100)),
            PipelineEvent::StageActive { stage, line } => println!("  [{stage}] active   {line}"),
            PipelineEvent::StageOutput { stage, text } => println!("  [{stage}] {text}"),
            PipelineEvent::StageComplete { stage } => println!("  [{stage}] complete"),
            PipelineEvent::CoordinationScore(score) => println!("  CIB score: {score:.1}"),
            PipelineEvent::Completed { verdict, confidence } => {
                println!("{}", Notice::new(NoticeLevel::Success, format!("Analysis complete: {} ({:.2})", verdict.label(), confidence)))
            }
            PipelineEvent::HumanReviewRecommended { .. } => {
                println!("{}", Notice::new(NoticeLevel::Warning, "Low confidence detected - Human review recommended"))
            }
        }
    }
}

fn print_verdict(r: &AnalysisResult) {
    println!("#{} {} - {}% confidence", r.id, r.verdict.label(), r.confidence_percent());
    println!("  {}", r.explanation);
    println!("  sources: {}", r.detailed_analysis.sources_checked.join("; "));
}

fn print_rows<'a>(rows: impl IntoIterator<Item = &'a AnalysisResult>) {
    let mut any = false;
    for r in rows {
        any = true;
        println!(
            "{:>4}  {:<60}  {:<10}  {:>3}%  {}",
            r.id,
            ellipsize(&r.claim, 57),
            r.verdict.label(),
            r.confidence_percent(),
            format_timestamp(&r.timestamp)
        );
    }
    if !any {
        println!("(no history)");
    }
}

fn report_export(what: &str, written: ExportResult<PathBuf>) {
    match written {
        Ok(path) => println!("{}", Notice::new(NoticeLevel::Success, format!("{what} written to {}", path.display()))),
        Err(e) => println!("{}", Notice::from(&e)),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => println!("{}", Notice::new(NoticeLevel::Error, e.to_string())),
    }
}

fn start_analysis(runs: &mut BackgroundRuns, session: &Arc<Session>, claim: String) {
    runs.spawn(session, claim, |outcome| match outcome {
        Ok(r) => print_verdict(&r),
        Err(e) => println!("{}", Notice::from(&e)),
    });
}

const SHELL_HELP: &str = "commands: analyze <claim> | history [query] | sort <id|claim|verdict|confidence|timestamp> [desc] | \
view <id> | delete <id> | reset | stages | graph | workflow | export-pdf | export-csv | speed <1-3> | auto <on|off> | \
rate <0-5> | settings | simulate [keyword] | help | quit";

async fn shell(session: Arc<Session>, data_dir: PathBuf) -> Result<()> {
    println!("{SHELL_HELP}");
    let mut runs = BackgroundRuns::default();
    if session.settings().auto_sim {
        println!("{}", Notice::new(NoticeLevel::Info, "Auto-simulate is on: analysing a sample claim"));
        start_analysis(&mut runs, &session, session.sample_claim().to_string());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').map(|(c, r)| (c, r.trim())).unwrap_or((line, ""));
        match cmd {
            "" => {}
            "analyze" => start_analysis(&mut runs, &session, rest.to_string()),
            "history" => print_rows(&session.search(rest)),
            "sort" => {
                let mut parts = rest.split_whitespace();
                match parts.next().unwrap_or("id").parse::<SortKey>() {
                    Ok(key) => {
                        let order = if parts.next() == Some("desc") { SortOrder::Descending } else { SortOrder::Ascending };
                        print_rows(&session.sorted_history(key, order));
                    }
                    Err(e) => println!("{}", Notice::new(NoticeLevel::Error, e)),
                }
            }
            "view" => match rest.parse::<u64>().ok().and_then(|id| session.view(id)) {
                Some(r) => {
                    println!("Claim: {}", r.claim);
                    print_verdict(&r);
                }
                None => println!("{}", Notice::new(NoticeLevel::Warning, "No such entry")),
            },
            "delete" => match rest.parse::<u64>() {
                Ok(id) if session.delete(id) => println!("{}", Notice::new(NoticeLevel::Success, "Entry deleted")),
                Ok(_) => println!("{}", Notice::new(NoticeLevel::Info, "No such entry")),
                Err(_) => println!("{}", Notice::new(NoticeLevel::Error, "delete expects a numeric id")),
            },
            "reset" => {
                session.reset_history();
                println!("{}", Notice::new(NoticeLevel::Success, "Demo data reset"));
            }
            "stages" => {
                for s in session.stages() {
                    println!("  {:<12} {:?}  {}", s.stage.name(), s.status, s.output_text);
                }
            }
            "graph" => match session.graph_frame() {
                Some(f) => {
                    println!(
                        "Total Accounts: {} | Bot Network: {}% | Coordination: {:.2}",
                        f.caption.total_accounts, f.caption.bot_percentage, f.caption.coord_score
                    );
                    println!("frame {} | {} nodes | {} edges ({} strong)", f.seq, f.nodes.len(), f.edges.len(), f.edges.iter().filter(|e| e.strong).count());
                }
                None => println!("{}", Notice::new(NoticeLevel::Info, "Run an analysis to see the coordination graph")),
            },
            "workflow" => match session.workflow() {
                Some(w) => print_json(&w),
                None => println!("{}", Notice::new(NoticeLevel::Info, "No analysis yet")),
            },
            "export-pdf" => report_export("PDF report", session.save_report(&data_dir, Utc::now()).await),
            "export-csv" => report_export("History", session.save_table(&data_dir, Utc::now()).await),
            "speed" => match rest.parse::<u8>().map_err(|e| e.to_string()).and_then(SimSpeed::try_from) {
                Ok(speed) => println!("{:?}", session.set_sim_speed(speed)),
                Err(e) => println!("{}", Notice::new(NoticeLevel::Error, e)),
            },
            "auto" => println!("{:?}", session.set_auto_sim(matches!(rest, "on" | "true" | "1"))),
            "rate" => match rest.parse::<u8>() {
                Ok(r) => {
                    session.set_feedback_rating(r);
                    println!("{}", Notice::new(NoticeLevel::Success, "Thank you for your feedback!"));
                }
                Err(_) => println!("{}", Notice::new(NoticeLevel::Error, "rate expects 0-5")),
            },
            "settings" => print_json(&session.settings()),
            "simulate" => {
                let report = session.simulate(rest, |l| println!("{l}")).await;
                println!("metrics: retweet {}% | engagement {}% | bot {}%", report.metrics.retweet, report.metrics.engagement, report.metrics.bot);
            }
            "help" => println!("{SHELL_HELP}"),
            "quit" | "exit" => break,
            other => println!("{}", Notice::new(NoticeLevel::Error, format!("unknown command: {other}"))),
        }
    }
    if runs.pending() > 0 {
        println!("{}", Notice::new(NoticeLevel::Info, "Waiting for the running analysis to finish"));
    }
    runs.finish().await;
    session.stop_graph();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claimwatch=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(FileStore::in_dir(&cli.data_dir));
    let session = Arc::new(Session::new(store, Arc::new(ConsoleObserver), cli.seed));

    match cli.cmd {
        Cmd::Analyze { claim, export } => {
            match session.analyze(&claim).await {
                Ok(r) => {
                    print_verdict(&r);
                    if r.needs_human_review() {
                        // let the delayed review notice print before exiting
                        tokio::time::sleep(REVIEW_DELAY + Duration::from_millis(50)).await;
                    }
                }
                Err(e) => println!("{}", Notice::from(&e)),
            }
            if export {
                let now = Utc::now();
                report_export("PDF report", session.save_report(&cli.data_dir, now).await);
                report_export("History", session.save_table(&cli.data_dir, now).await);
            }
            session.stop_graph();
        }
        Cmd::Simulate { keyword } => {
            let report = session.simulate(keyword.as_deref().unwrap_or(""), |l| println!("{l}")).await;
            println!("metrics: retweet {}% | engagement {}% | bot {}%", report.metrics.retweet, report.metrics.engagement, report.metrics.bot);
        }
        Cmd::Settings { speed, auto_sim, rating } => {
            if let Some(s) = speed {
                let speed = SimSpeed::try_from(s).map_err(anyhow::Error::msg)?;
                session.set_sim_speed(speed);
            }
            if let Some(on) = auto_sim {
                session.set_auto_sim(on);
            }
            if let Some(r) = rating {
                session.set_feedback_rating(r);
            }
            print_json(&session.settings());
        }
        Cmd::Shell => shell(session, cli.data_dir).await?,
    }
    Ok(())
}
