//! Verdict extraction from the coordinator's conclusion.

use serde::{Deserialize, Serialize};

use super::types::{PanelRole, Transcript};

/// Outcome of a deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    Undetermined,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Undetermined => "undetermined",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const NEGATIONS: [&str; 3] = ["not approved", "disapproved", "rejected"];

/// Classify one message. Any negation overrides a bare "approved".
pub fn parse_verdict(message: &str) -> Verdict {
    let text = message.to_lowercase();
    let negated = NEGATIONS.iter().any(|n| text.contains(n));

    if text.contains("approved") && !negated {
        Verdict::Approved
    } else if negated {
        Verdict::Rejected
    } else {
        Verdict::Undetermined
    }
}

/// Verdict of the latest coordinator message, or undetermined if the
/// coordinator never spoke.
pub fn transcript_verdict(transcript: &Transcript) -> Verdict {
    transcript
        .latest_from(PanelRole::Coordinator)
        .map(|m| parse_verdict(&m.message))
        .unwrap_or(Verdict::Undetermined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::{AgentMessage, Author};

    #[test]
    fn test_approved() {
        assert_eq!(
            parse_verdict("Approved: clear terraced pattern with associated structures"),
            Verdict::Approved
        );
    }

    #[test]
    fn test_rejected() {
        assert_eq!(
            parse_verdict("Rejected: no archaeological features detected"),
            Verdict::Rejected
        );
    }

    #[test]
    fn test_negation_overrides_approved() {
        assert_eq!(
            parse_verdict("not approved due to insufficient evidence"),
            Verdict::Rejected
        );
        assert_eq!(parse_verdict("The panel DISAPPROVED."), Verdict::Rejected);
        assert_eq!(
            parse_verdict("Initially approved, but finally rejected."),
            Verdict::Rejected
        );
    }

    #[test]
    fn test_undetermined() {
        assert_eq!(parse_verdict("We need more data."), Verdict::Undetermined);
        assert_eq!(parse_verdict(""), Verdict::Undetermined);
    }

    #[test]
    fn test_transcript_uses_latest_coordinator_message() {
        let mut t = Transcript::seeded("ctx");
        t.push(AgentMessage::new(
            Author::Panel(PanelRole::Coordinator),
            "Rejected: let's see",
        ));
        t.push(AgentMessage::new(
            Author::Panel(PanelRole::Coordinator),
            "Approved: enclosure with ditch",
        ));
        t.push(AgentMessage::new(
            Author::Panel(PanelRole::Analyst),
            "rejected by me",
        ));
        assert_eq!(transcript_verdict(&t), Verdict::Approved);
    }

    #[test]
    fn test_transcript_without_coordinator() {
        let mut t = Transcript::seeded("ctx");
        t.push(AgentMessage::new(Author::System, "Approved"));
        assert_eq!(transcript_verdict(&t), Verdict::Undetermined);
    }
}
