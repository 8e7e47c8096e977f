//! Counter-narrative drafts for the response stage.

use crate::history::format_timestamp;
use crate::segments::truncate_graphemes;
use crate::types::Verdict;
use chrono::{DateTime, Utc};

const QUOTE_LEN: usize = 60;

pub fn draft_response(claim: &str, verdict: Verdict, at: DateTime<Utc>) -> String {
    let quoted = truncate_graphemes(claim, QUOTE_LEN);
    let when = format_timestamp(&at);
    match verdict {
        Verdict::False => format!(
            "⚠️ FACT CHECK: The following claim is FALSE.\n\n\"{quoted}...\"\n\n✅ Verified by PIB, NIA, and official sources.\n📅 {when}\n\nPlease verify before sharing. #FactCheck #ClaimWatch"
        ),
        Verdict::True => format!(
            "✅ VERIFIED: The following claim is TRUE.\n\n\"{quoted}...\"\n\n📌 Confirmed by multiple credible sources.\n📅 {when}\n\n#Verified #ClaimWatch"
        ),
        Verdict::Unverified => format!(
            "⚠️ UNVERIFIED: Insufficient evidence to confirm this claim.\n\n\"{quoted}...\"\n\n🔍 Human review recommended.\n📅 {when}\n\n#PendingVerification #ClaimWatch"
        ),
        Verdict::Mixed => format!(
            "⚠️ PARTIALLY TRUE: This claim contains misleading elements.\n\n\"{quoted}...\"\n\n📊 Context needed for full understanding.\n📅 {when}\n\n#ContextMatters #ClaimWatch"
        ),
    }
}
