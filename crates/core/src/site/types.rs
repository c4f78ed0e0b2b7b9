//! Site records and the components attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Graph label under which site records double as relationship endpoints.
pub const SITE_LABEL: &str = "ArchaeologicalSite";

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// (0, 0) is what processors report when they could not georeference
    /// the input, so it is treated as "unknown".
    pub fn is_valid(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Lifecycle of a site record as seen by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    /// Created when the external processors report success.
    Processing,
    /// The analysis sub-orchestration finished.
    Analyzed,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Analyzed => write!(f, "analyzed"),
        }
    }
}

/// Reference to the user who uploaded the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A candidate site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_id: String,
    pub name: String,
    pub coordinates: Coordinates,
    pub status: SiteStatus,
    /// Only ever set to true on an unambiguous panel approval.
    pub is_possible_archaeological_site: bool,
    pub owner: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub components: Vec<SiteComponent>,
}

impl SiteRecord {
    /// New record in the `Processing` state.
    pub fn processing(
        site_id: impl Into<String>,
        coordinates: Coordinates,
        owner: Option<UserRef>,
    ) -> Self {
        let site_id = site_id.into();
        let now = Utc::now();
        Self {
            name: format!("Site {}", site_id),
            site_id,
            coordinates,
            status: SiteStatus::Processing,
            is_possible_archaeological_site: false,
            owner,
            created_at: now,
            updated_at: now,
            components: Vec::new(),
        }
    }

    pub fn component(&self, name: &str) -> Option<&SiteComponent> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// A generated product attached to a site. Keyed by `(site_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteComponent {
    pub site_id: String,
    pub name: String,
    pub state: String,
    pub coordinates: Coordinates,
    pub image_url: String,
}

impl SiteComponent {
    pub fn available(
        site_id: impl Into<String>,
        name: impl Into<String>,
        coordinates: Coordinates,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            name: name.into(),
            state: "Available".to_string(),
            coordinates,
            image_url: image_url.into(),
        }
    }
}

/// Scoring entry recorded once a site has been analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub site_id: String,
    pub points_awarded: u32,
    /// Mean feature confidence as a percentage.
    pub accuracy: f64,
}

/// Points granted to a user under a stable key, so re-running the
/// granting activity never double counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAward {
    pub key: String,
    pub points: u32,
}

/// Graph node written by the relationship activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String,
    pub key: String,
    pub properties: serde_json::Value,
}

/// Directed relationship between two graph nodes, unique per
/// `(from, kind, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub from_label: String,
    pub from_key: String,
    pub kind: String,
    pub to_label: String,
    pub to_key: String,
}
