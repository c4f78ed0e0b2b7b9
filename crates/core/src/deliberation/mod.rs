//! Specialist panel deliberation.
//!
//! A fixed four-role panel discusses a site until the coordinator reaches a
//! conclusion or the round cap is hit. Speaker selection and termination are
//! pure functions of the transcript and the round counter (see [`policy`]);
//! the verdict is read from the latest coordinator message (see
//! [`parse_verdict`]).

mod panel;
pub mod policy;
mod prompts;
mod runner;
mod types;
mod verdict;

pub use panel::{CompletionPanel, Panelist};
pub use policy::{select_next_speaker, should_terminate, TurnPolicy, DEFAULT_MAX_ROUNDS};
pub use prompts::{build_initial_context, render_transcript, role_instructions};
pub use runner::{Deliberation, DeliberationOutcome};
pub use types::{AgentMessage, Author, DeliberationError, PanelRole, Transcript};
pub use verdict::{parse_verdict, transcript_verdict, Verdict};
