//! Final changelog text assembly.
//!
//! Pure given its inputs: the overall narrative (AI-produced or fallback)
//! followed by one section per commit summary.

use shiplog_types::CommitSummary;

/// Assemble the final changelog body.
///
/// Each commit section uses the first line of the commit message as its
/// heading, the summary as its body, and a `+X -Y lines` trailer.
pub fn assemble(overall: &str, summaries: &[CommitSummary]) -> String {
    let mut out = String::with_capacity(overall.len() + summaries.len() * 120);
    out.push_str(overall.trim());
    out.push('\n');

    for summary in summaries {
        out.push('\n');
        out.push_str("### ");
        out.push_str(summary.title());
        out.push('\n');
        out.push_str(summary.summary.trim());
        out.push('\n');
        out.push_str(&format!(
            "+{} -{} lines\n",
            summary.additions, summary.deletions
        ));
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sections_follow_the_overall_narrative() {
        let summaries = vec![CommitSummary {
            sha: "a1".into(),
            message: "feat: faster parser\n\ndetails".into(),
            additions: 41,
            deletions: 7,
            summary: "Parsing is roughly twice as fast.".into(),
        }];
        let text = assemble("A big release.", &summaries);
        assert!(text.starts_with("A big release.\n"));
        assert!(text.contains("### feat: faster parser\n"));
        assert!(text.contains("Parsing is roughly twice as fast.\n"));
        assert!(text.contains("+41 -7 lines"));
    }

    #[test]
    fn no_summaries_yields_just_the_narrative() {
        assert_eq!(assemble("Quiet week.", &[]), "Quiet week.\n");
    }
}
