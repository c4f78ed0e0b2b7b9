//! Panel roles, messages and the append-only transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four fixed panel members, in panel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelRole {
    Coordinator,
    Analyst,
    TerrainSpecialist,
    EnvironmentalExpert,
}

impl PanelRole {
    /// Whole panel in its fixed order.
    pub const PANEL: [PanelRole; 4] = [
        PanelRole::Coordinator,
        PanelRole::Analyst,
        PanelRole::TerrainSpecialist,
        PanelRole::EnvironmentalExpert,
    ];

    /// Specialists in tie-break order.
    pub const SPECIALISTS: [PanelRole; 3] = [
        PanelRole::Analyst,
        PanelRole::TerrainSpecialist,
        PanelRole::EnvironmentalExpert,
    ];

    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Coordinator => "TeamCoordinator",
            Self::Analyst => "ArchaeologicalAnalyst",
            Self::TerrainSpecialist => "TerrainSpecialist",
            Self::EnvironmentalExpert => "EnvironmentalExpert",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Coordinator => "Archaeological Team Coordinator",
            Self::Analyst => "Archaeological Analyst",
            Self::TerrainSpecialist => "Terrain Specialist",
            Self::EnvironmentalExpert => "Environmental Expert",
        }
    }
}

impl std::fmt::Display for PanelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.agent_name())
    }
}

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum Author {
    /// The seed message describing the site.
    Context,
    /// A failure notice written in place of a discussion.
    System,
    Panel(PanelRole),
}

impl Author {
    pub fn panel_role(&self) -> Option<PanelRole> {
        match self {
            Self::Panel(role) => Some(*role),
            Self::Context | Self::System => None,
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub author: Author,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(author: Author, message: impl Into<String>) -> Self {
        let (agent_id, agent_name) = match author {
            Author::Context => ("context".to_string(), "User".to_string()),
            Author::System => ("system".to_string(), "System".to_string()),
            Author::Panel(role) => (
                role.agent_name().to_ascii_lowercase(),
                role.agent_name().to_string(),
            ),
        };
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            agent_id,
            agent_name,
            author,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only deliberation record. Order is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<AgentMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript opened with the site context message.
    pub fn seeded(context: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(AgentMessage::new(Author::Context, context));
        transcript
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    /// Panel role of the latest entry, if a panel member wrote it.
    pub fn last_speaker(&self) -> Option<PanelRole> {
        self.last().and_then(|m| m.author.panel_role())
    }

    /// Number of entries written by `role`.
    pub fn turns_of(&self, role: PanelRole) -> usize {
        self.messages
            .iter()
            .filter(|m| m.author == Author::Panel(role))
            .count()
    }

    /// Number of panel-authored entries.
    pub fn panel_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.author.panel_role().is_some())
            .count()
    }

    /// Most recent coordinator entry.
    pub fn latest_from(&self, role: PanelRole) -> Option<&AgentMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.author == Author::Panel(role))
    }
}

/// Errors from a deliberation run.
#[derive(Debug, Error)]
pub enum DeliberationError {
    #[error("{role} failed to respond: {message}")]
    Panelist { role: PanelRole, message: String },

    #[error("{0} returned an empty response")]
    EmptyResponse(PanelRole),
}
