//! Turn selection and termination.
//!
//! Both rules are pure functions of the transcript and the round counter;
//! [`TurnPolicy`] only owns the counter.

use super::types::{PanelRole, Transcript};

pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Pick who speaks in `round` (1-based, already incremented for this
/// selection).
pub fn select_next_speaker(transcript: &Transcript, round: u32, max_rounds: u32) -> PanelRole {
    if transcript.len() <= 1 {
        return PanelRole::Coordinator;
    }
    if round >= max_rounds {
        return PanelRole::Coordinator;
    }

    match transcript.last_speaker() {
        Some(PanelRole::Coordinator) => least_active_specialist(transcript),
        _ if round % 2 == 0 => PanelRole::Coordinator,
        Some(PanelRole::TerrainSpecialist) => PanelRole::EnvironmentalExpert,
        Some(PanelRole::EnvironmentalExpert) => PanelRole::Analyst,
        Some(PanelRole::Analyst) => PanelRole::TerrainSpecialist,
        // Context or system entries are not panel turns.
        None => PanelRole::Coordinator,
    }
}

/// Specialist with the fewest turns so far; ties go to panel order.
fn least_active_specialist(transcript: &Transcript) -> PanelRole {
    let mut best = PanelRole::SPECIALISTS[0];
    let mut best_turns = transcript.turns_of(best);
    for role in &PanelRole::SPECIALISTS[1..] {
        let turns = transcript.turns_of(*role);
        if turns < best_turns {
            best = *role;
            best_turns = turns;
        }
    }
    best
}

/// Whether the discussion is over after the latest message.
pub fn should_terminate(transcript: &Transcript, round: u32, max_rounds: u32) -> bool {
    if round >= max_rounds {
        return true;
    }
    if round < 2 {
        return false;
    }

    match transcript.last() {
        Some(message) if transcript.last_speaker() == Some(PanelRole::Coordinator) => {
            let text = message.message.to_lowercase();
            text.contains("approved") || text.contains("rejected")
        }
        _ => false,
    }
}

/// Round counter for one deliberation run.
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    max_rounds: u32,
    round: u32,
}

impl TurnPolicy {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_rounds,
            round: 0,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Advance the round counter and pick the next speaker.
    pub fn next_speaker(&mut self, transcript: &Transcript) -> PanelRole {
        self.round += 1;
        select_next_speaker(transcript, self.round, self.max_rounds)
    }

    pub fn should_terminate(&self, transcript: &Transcript) -> bool {
        should_terminate(transcript, self.round, self.max_rounds)
    }
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::{AgentMessage, Author};

    const MAX: u32 = DEFAULT_MAX_ROUNDS;

    fn transcript(speakers: &[PanelRole]) -> Transcript {
        let mut t = Transcript::seeded("site context");
        for role in speakers {
            t.push(AgentMessage::new(
                Author::Panel(*role),
                format!("{} speaking", role),
            ));
        }
        t
    }

    fn with_last(mut t: Transcript, role: PanelRole, text: &str) -> Transcript {
        t.push(AgentMessage::new(Author::Panel(role), text));
        t
    }

    #[test]
    fn test_short_transcript_opens_with_coordinator() {
        assert_eq!(
            select_next_speaker(&Transcript::new(), 1, MAX),
            PanelRole::Coordinator
        );
        for round in 0..10 {
            assert_eq!(
                select_next_speaker(&Transcript::seeded("ctx"), round, MAX),
                PanelRole::Coordinator
            );
        }
    }

    #[test]
    fn test_round_cap_forces_coordinator() {
        use PanelRole::*;
        let histories = [
            vec![Coordinator],
            vec![Coordinator, Analyst],
            vec![Coordinator, Analyst, TerrainSpecialist],
            vec![Coordinator, Analyst, TerrainSpecialist, EnvironmentalExpert],
        ];
        for history in &histories {
            for round in MAX..MAX + 3 {
                assert_eq!(
                    select_next_speaker(&transcript(history), round, MAX),
                    Coordinator
                );
            }
        }
    }

    #[test]
    fn test_after_coordinator_least_active_specialist() {
        use PanelRole::*;
        // Nobody has spoken: tie broken by panel order.
        assert_eq!(select_next_speaker(&transcript(&[Coordinator]), 2, MAX), Analyst);

        let t = transcript(&[Coordinator, Analyst, Coordinator]);
        assert_eq!(select_next_speaker(&t, 3, MAX), TerrainSpecialist);

        let t = transcript(&[Coordinator, Analyst, TerrainSpecialist, Coordinator]);
        assert_eq!(select_next_speaker(&t, 3, MAX), EnvironmentalExpert);

        let t = transcript(&[
            Coordinator,
            Analyst,
            TerrainSpecialist,
            EnvironmentalExpert,
            Coordinator,
        ]);
        assert_eq!(select_next_speaker(&t, 4, MAX), Analyst);
    }

    #[test]
    fn test_selected_specialist_has_minimum_turns() {
        use PanelRole::*;
        let t = transcript(&[
            Coordinator,
            TerrainSpecialist,
            EnvironmentalExpert,
            Analyst,
            TerrainSpecialist,
            Coordinator,
        ]);
        let chosen = select_next_speaker(&t, 3, 10);
        let min = PanelRole::SPECIALISTS
            .iter()
            .map(|r| t.turns_of(*r))
            .min()
            .unwrap();
        assert_eq!(t.turns_of(chosen), min);
        assert_eq!(chosen, Analyst);
    }

    #[test]
    fn test_even_round_synthesis() {
        use PanelRole::*;
        let t = transcript(&[Coordinator, Analyst]);
        assert_eq!(select_next_speaker(&t, 2, MAX), Coordinator);
        assert_eq!(select_next_speaker(&t, 4, MAX), Coordinator);
    }

    #[test]
    fn test_odd_round_rotation() {
        use PanelRole::*;
        let cases = [
            (TerrainSpecialist, EnvironmentalExpert),
            (EnvironmentalExpert, Analyst),
            (Analyst, TerrainSpecialist),
        ];
        for (last, expected) in cases {
            let t = transcript(&[Coordinator, last]);
            assert_eq!(select_next_speaker(&t, 3, MAX), expected, "after {}", last);
        }
    }

    #[test]
    fn test_non_panel_author_falls_back_to_coordinator() {
        let mut t = transcript(&[PanelRole::Coordinator]);
        t.push(AgentMessage::new(Author::System, "notice"));
        assert_eq!(select_next_speaker(&t, 3, MAX), PanelRole::Coordinator);
    }

    #[test]
    fn test_no_termination_before_round_two() {
        let t = with_last(Transcript::seeded("ctx"), PanelRole::Coordinator, "Approved: walls");
        assert!(!should_terminate(&t, 0, MAX));
        assert!(!should_terminate(&t, 1, MAX));
        assert!(should_terminate(&t, 2, MAX));
    }

    #[test]
    fn test_termination_requires_coordinator_conclusion() {
        let base = transcript(&[PanelRole::Coordinator, PanelRole::Analyst]);
        let t = with_last(base.clone(), PanelRole::Analyst, "I'd say approved");
        assert!(!should_terminate(&t, 3, MAX));

        let t = with_last(base.clone(), PanelRole::Coordinator, "Let us continue.");
        assert!(!should_terminate(&t, 3, MAX));

        let t = with_last(base, PanelRole::Coordinator, "REJECTED: natural ridge");
        assert!(should_terminate(&t, 3, MAX));
    }

    #[test]
    fn test_round_cap_terminates() {
        let t = transcript(&[PanelRole::Coordinator, PanelRole::Analyst]);
        assert!(should_terminate(&t, MAX, MAX));
        assert!(!should_terminate(&t, MAX - 1, MAX));
    }

    #[test]
    fn test_turn_policy_sequence() {
        use PanelRole::*;
        let mut policy = TurnPolicy::default();
        let mut t = Transcript::seeded("ctx");
        let mut speakers = Vec::new();

        while !policy.should_terminate(&t) {
            let role = policy.next_speaker(&t);
            speakers.push(role);
            t.push(AgentMessage::new(Author::Panel(role), "Still discussing."));
        }

        assert_eq!(
            speakers,
            vec![Coordinator, Analyst, TerrainSpecialist, Coordinator, Coordinator]
        );
        assert_eq!(policy.round(), MAX);
    }
}
