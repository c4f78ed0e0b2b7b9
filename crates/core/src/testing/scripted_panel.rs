//! Scripted deliberation panel for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::deliberation::{DeliberationError, PanelRole, Panelist, Transcript};

/// Panel whose replies are scripted per role.
///
/// Each role plays its replies in order, then falls back to the default
/// reply (empty unless set).
///
/// # Example
///
/// ```rust,ignore
/// let panel = ScriptedPanel::new()
///     .with_replies(PanelRole::Coordinator, &["Let us review.", "Approved: ring ditch"])
///     .with_default("The ditch looks man-made.");
/// ```
#[derive(Debug)]
pub struct ScriptedPanel {
    replies: Arc<RwLock<HashMap<PanelRole, VecDeque<String>>>>,
    default_reply: String,
    failing: HashSet<PanelRole>,
    calls: Arc<RwLock<Vec<PanelRole>>>,
}

impl Default for ScriptedPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPanel {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(RwLock::new(HashMap::new())),
            default_reply: String::new(),
            failing: HashSet::new(),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_replies(mut self, role: PanelRole, replies: &[&str]) -> Self {
        if let Some(map) = Arc::get_mut(&mut self.replies) {
            map.get_mut()
                .entry(role)
                .or_default()
                .extend(replies.iter().map(|r| r.to_string()));
        }
        self
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    /// Every turn of `role` fails.
    pub fn failing_on(mut self, role: PanelRole) -> Self {
        self.failing.insert(role);
        self
    }

    /// Roles asked to speak, in order.
    pub async fn calls(&self) -> Vec<PanelRole> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Panelist for ScriptedPanel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(
        &self,
        role: PanelRole,
        _transcript: &Transcript,
    ) -> Result<String, DeliberationError> {
        self.calls.write().await.push(role);

        if self.failing.contains(&role) {
            return Err(DeliberationError::Panelist {
                role,
                message: "scripted failure".to_string(),
            });
        }

        let scripted = self
            .replies
            .write()
            .await
            .get_mut(&role)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| self.default_reply.clone()))
    }
}
