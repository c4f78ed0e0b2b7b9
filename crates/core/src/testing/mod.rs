//! Testing utilities and mock implementations of the external collaborators.
//!
//! Everything here runs in memory, so whole site pipelines can be exercised
//! without a work queue, an imagery processor or a completion API.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_core::testing::{fixtures, MockCompletionClient, MockImageryProcessor, MockWorkQueue};
//!
//! let queue = MockWorkQueue::new();
//! let client = MockCompletionClient::new();
//! client.push_text(fixtures::TOPOGRAPHY_RESPONSE).await;
//!
//! // After dispatch, play the processor's part:
//! orchestrator.raise_event(&id, "LiDARProcessingCompleted", fixtures::success_result(12.5, 77.2)).await?;
//! ```

mod mock_completion;
mod mock_imagery;
mod mock_work_queue;
mod scripted_panel;

pub use mock_completion::MockCompletionClient;
pub use mock_imagery::{MockImageryProcessor, RecordedImageryCall};
pub use mock_work_queue::MockWorkQueue;
pub use scripted_panel::ScriptedPanel;

/// Test fixtures and helper functions.
pub mod fixtures {
    use super::ScriptedPanel;
    use crate::deliberation::PanelRole;
    use crate::event_bus::ProcessingResult;
    use crate::job::ProcessFileRequest;
    use crate::site::UserRef;

    /// Topography analysis with two features (mean confidence 0.7).
    pub const TOPOGRAPHY_RESPONSE: &str = r#"{"caption":"Circular enclosure","tags":["enclosure","earthwork"],"features":[{"name":"Ring ditch","confidence":0.8,"description":"30m ring"},{"name":"Bank","confidence":0.6,"description":"low bank"}]}"#;

    /// Spectral analysis with one cropmark.
    pub const SPECTRAL_RESPONSE: &str = r#"{"caption":"Cropmark ring","tags":["cropmark"],"features":[{"name":"Cropmark","confidence":0.5,"description":"NDVI anomaly"}]}"#;

    /// Upload from user `u1` with no workflow and no coordinates.
    pub fn upload(file_name: &str) -> ProcessFileRequest {
        ProcessFileRequest::new(file_name).with_user(UserRef {
            id: "u1".to_string(),
            display_name: Some("Surveyor".to_string()),
        })
    }

    /// Successful processor event with DTM, hillshade and slope locators.
    pub fn success_result(lat: f64, lon: f64) -> ProcessingResult {
        ProcessingResult {
            status: "Success".to_string(),
            output_dir: Some("outputs/mound_survey".to_string()),
            lat,
            lon,
            dtm_image: Some("https://blobs.test/outputs/dtm.png".to_string()),
            hillshade_image: Some("https://blobs.test/outputs/hillshade.png".to_string()),
            slope_image: Some("https://blobs.test/outputs/slope.png".to_string()),
            ..Default::default()
        }
    }

    pub fn failed_result(message: &str) -> ProcessingResult {
        ProcessingResult {
            status: "Failed".to_string(),
            error_message: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Coordinator opens, specialists comment, coordinator approves.
    pub fn approving_panel() -> ScriptedPanel {
        ScriptedPanel::new()
            .with_replies(
                PanelRole::Coordinator,
                &[
                    "Let us review the enclosure.",
                    "Approved: clear ring ditch with associated bank",
                ],
            )
            .with_default("The ring ditch looks man-made.")
    }

    pub fn rejecting_panel() -> ScriptedPanel {
        ScriptedPanel::new()
            .with_replies(
                PanelRole::Coordinator,
                &[
                    "Let us review.",
                    "Rejected: no archaeological features detected",
                ],
            )
            .with_default("Looks like natural drainage.")
    }
}
