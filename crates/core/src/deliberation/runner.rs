//! Drives one panel session to termination.

use std::sync::Arc;

use tracing::{debug, info};

use super::panel::Panelist;
use super::policy::TurnPolicy;
use super::types::{AgentMessage, Author, DeliberationError, Transcript};
use super::verdict::{transcript_verdict, Verdict};
use crate::metrics;

/// Result of a finished session.
#[derive(Debug, Clone)]
pub struct DeliberationOutcome {
    pub transcript: Transcript,
    pub verdict: Verdict,
    pub rounds: u32,
}

/// Strictly sequential: one speaker at a time, exactly one message
/// appended per turn.
pub struct Deliberation {
    panel: Arc<dyn Panelist>,
    max_rounds: u32,
}

impl Deliberation {
    pub fn new(panel: Arc<dyn Panelist>, max_rounds: u32) -> Self {
        Self { panel, max_rounds }
    }

    /// Run a session seeded with `context`.
    pub async fn run(
        &self,
        site_id: &str,
        context: String,
    ) -> Result<DeliberationOutcome, DeliberationError> {
        let mut transcript = Transcript::seeded(context);
        let mut policy = TurnPolicy::new(self.max_rounds);

        info!(
            "Starting panel deliberation for site {} ({} rounds max, panel {})",
            site_id,
            self.max_rounds,
            self.panel.name()
        );

        while !policy.should_terminate(&transcript) {
            let role = policy.next_speaker(&transcript);
            let text = self.panel.respond(role, &transcript).await?;
            if text.trim().is_empty() {
                return Err(DeliberationError::EmptyResponse(role));
            }

            debug!("Round {} for site {}: {} spoke", policy.round(), site_id, role);
            transcript.push(AgentMessage::new(Author::Panel(role), text.trim()));
        }

        let verdict = transcript_verdict(&transcript);
        metrics::DELIBERATION_ROUNDS.observe(f64::from(policy.round()));
        metrics::VERDICTS_TOTAL
            .with_label_values(&[verdict.as_str()])
            .inc();

        info!(
            "Deliberation for site {} finished after {} rounds: {}",
            site_id,
            policy.round(),
            verdict
        );

        Ok(DeliberationOutcome {
            transcript,
            verdict,
            rounds: policy.round(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::PanelRole;
    use crate::testing::ScriptedPanel;

    #[tokio::test]
    async fn test_coordinator_approval_ends_session() {
        let panel = Arc::new(
            ScriptedPanel::new()
                .with_replies(
                    PanelRole::Coordinator,
                    &["Let us review.", "Approved: ring ditch with bank"],
                )
                .with_default("Features look man-made."),
        );
        let deliberation = Deliberation::new(panel.clone(), 5);

        let outcome = deliberation.run("s1", "# Site".to_string()).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::Approved);
        assert_eq!(outcome.rounds, 4);
        // Seed + one message per round.
        assert_eq!(outcome.transcript.len(), 5);
        assert_eq!(
            panel.calls().await,
            vec![
                PanelRole::Coordinator,
                PanelRole::Analyst,
                PanelRole::TerrainSpecialist,
                PanelRole::Coordinator,
            ]
        );
    }

    #[tokio::test]
    async fn test_round_cap_forces_summary() {
        let panel = Arc::new(
            ScriptedPanel::new()
                .with_replies(
                    PanelRole::Coordinator,
                    &["Open.", "Keep going.", "Rejected: natural terraces"],
                )
                .with_default("Unclear."),
        );
        let outcome = Deliberation::new(panel, 5)
            .run("s1", "# Site".to_string())
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.verdict, Verdict::Rejected);
        assert_eq!(
            outcome.transcript.last_speaker(),
            Some(PanelRole::Coordinator)
        );
    }

    #[tokio::test]
    async fn test_undetermined_without_conclusion() {
        let panel = Arc::new(ScriptedPanel::new().with_default("Hmm."));
        let outcome = Deliberation::new(panel, 3)
            .run("s1", "# Site".to_string())
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Undetermined);
        assert_eq!(outcome.rounds, 3);
    }

    #[tokio::test]
    async fn test_panelist_failure_aborts() {
        let panel = Arc::new(
            ScriptedPanel::new()
                .with_default("ok")
                .failing_on(PanelRole::Analyst),
        );
        let err = Deliberation::new(panel, 5)
            .run("s1", "# Site".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliberationError::Panelist {
                role: PanelRole::Analyst,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_reply_rejected() {
        let panel = Arc::new(ScriptedPanel::new().with_default("   "));
        let err = Deliberation::new(panel, 5)
            .run("s1", "# Site".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliberationError::EmptyResponse(PanelRole::Coordinator)
        ));
    }
}
