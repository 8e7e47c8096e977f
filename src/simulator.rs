//! Console-style walkthrough of the pipeline for a keyword.
//!
//! Unlike a real run this neither touches history nor takes the run guard.

use crate::settings::SimSpeed;
use crate::types::Verdict;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

pub const SAMPLE_CLAIMS: [&str; 5] = [
    "Breaking: Terrorist Attack in Jammu - Multiple casualties reported",
    "Mumbai Bridge Collapse: 50+ feared dead in infrastructure failure",
    "Election Deepfake Video: PM candidate caught in fabricated scandal",
    "Natural Disaster: Fake image shows tsunami hitting Chennai marina",
    "Celebrity Death Hoax: Bollywood star rumored dead in accident",
];

const LEAD_IN: Duration = Duration::from_millis(500);
const GAP: Duration = Duration::from_millis(300);
const AUDIT_PAUSE: Duration = Duration::from_millis(500);

pub fn sample_claim<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SAMPLE_CLAIMS.choose(rng).copied().unwrap_or(SAMPLE_CLAIMS[0])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTargets {
    pub retweet: u32,
    pub engagement: u32,
    pub bot: u32,
}

pub const METRIC_TARGETS: MetricTargets = MetricTargets { retweet: 60, engagement: 45, bot: 70 };

/// Random draws for one walkthrough, fixed before any delay.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub keyword: String,
    pub bot_activity: u32,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub lines: Vec<String>,
    pub plan: SimulationPlan,
    pub metrics: MetricTargets,
}

impl SimulationPlan {
    /// A blank keyword falls back to a random sample claim.
    pub fn draw<R: Rng + ?Sized>(keyword: &str, rng: &mut R) -> Self {
        let keyword = match keyword.trim() {
            "" => sample_claim(rng).to_string(),
            k => k.to_string(),
        };
        let bot_activity = rng.gen_range(15..35);
        let verdict = *Verdict::ALL.choose(rng).unwrap_or(&Verdict::Unverified);
        Self { keyword, bot_activity, verdict }
    }

    pub async fn play<F: FnMut(&str)>(self, speed: SimSpeed, mut on_line: F) -> SimulationReport {
        let delay = speed.stage_delay();
        let mut lines = Vec::new();
        let mut emit = |line: String| {
            on_line(&line);
            lines.push(line);
        };

        emit(format!("> Starting pipeline for: \"{}\"", self.keyword));
        sleep(LEAD_IN).await;
        emit("> Detection Agent: Scanning platforms...".into());
        sleep(delay).await;
        emit("  ✓ Found 247 matching posts".into());

        sleep(GAP).await;
        emit("> Cluster Agent: Analyzing network...".into());
        sleep(delay).await;
        emit(format!("  ✓ Bot activity: {}%", self.bot_activity));

        sleep(GAP).await;
        emit("> Verification Agent: Cross-referencing...".into());
        sleep(delay).await;
        emit(format!("  ✓ Verdict: {}", self.verdict.label()));

        sleep(GAP).await;
        emit("> Response Agent: Generating counter-narrative...".into());
        sleep(delay).await;
        emit("  ✓ Response draft ready".into());

        sleep(GAP).await;
        emit("> Audit Agent: Logging results...".into());
        sleep(AUDIT_PAUSE).await;
        emit("  ✓ Analysis complete".into());
        emit("> Pipeline finished successfully".into());

        SimulationReport { lines, plan: self, metrics: METRIC_TARGETS }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blank_keyword_uses_sample_claim() {
        let mut rng = StdRng::seed_from_u64(2);
        let plan = SimulationPlan::draw("   ", &mut rng);
        assert!(SAMPLE_CLAIMS.contains(&plan.keyword.as_str()));
        assert!((15..35).contains(&plan.bot_activity));
    }

    #[tokio::test(start_paused = true)]
    async fn walkthrough_prints_every_agent() {
        let plan = SimulationPlan { keyword: "deepfake".into(), bot_activity: 21, verdict: Verdict::Mixed };
        let mut streamed = 0;
        let start = tokio::time::Instant::now();
        let report = plan.play(SimSpeed::Fast, |_| streamed += 1).await;
        assert_eq!(streamed, report.lines.len());
        assert_eq!(report.lines[0], "> Starting pipeline for: \"deepfake\"");
        assert!(report.lines.contains(&"  ✓ Bot activity: 21%".to_string()));
        assert!(report.lines.contains(&"  ✓ Verdict: MIXED".to_string()));
        assert_eq!(report.lines.last().unwrap(), "> Pipeline finished successfully");
        assert!(start.elapsed() >= Duration::from_millis(500 + 4 * 500 + 4 * 300 + 500));
    }
}
