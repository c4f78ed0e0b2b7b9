//! Role instructions and the seed context for a panel session.

use super::types::{Author, PanelRole, Transcript};
use crate::analysis::AnalysisResult;
use crate::site::Coordinates;

const COORDINATOR: &str = "\
You coordinate a panel reviewing a candidate archaeological site.
- Moderate between the ArchaeologicalAnalyst, TerrainSpecialist and EnvironmentalExpert and make sure every interpretation is challenged.
- Evidence from the topography analysis outranks everything else. Elevation confidence, terraces or environmental plausibility never justify approval on their own.
- Approve only when the panel agrees the topography shows clear, structured, human-made patterns. Ambiguous or unsupported features mean rejection.
- A rejection is definitive; do not ask for further investigation.
When you conclude, your message must start with exactly one of:
Approved: <reason>
Rejected: <reason>";

const ANALYST: &str = "\
You are an archaeological analyst reading pre-processed topography results.
- For each detected feature weigh its confidence and description and argue whether it is archaeological or natural.
- Roads, routeways and isolated linear earthworks do not count unless they belong to a patterned complex. Terraces alone are not enough.
- Judge by the visible pattern, not by the confidence score alone.
- If the topography shows no human modification, say 'Rejected'.";

const TERRAIN: &str = "\
You are a terrain and geomorphology specialist.
- Look for natural explanations first: erosion, sedimentation, geological processes.
- Elevation evidence supports an interpretation only when the topography analysis agrees.
- Agree with an archaeological reading only if the feature cannot be explained naturally.
- If the topography analysis detected no archaeological features, say 'Rejected'.";

const ENVIRONMENTAL: &str = "\
You are an environmental expert on human-environment relationships.
- Assess whether the landscape would have supported human activity: water, defensibility, resources.
- Environmental context may support but never replace topographic evidence.
- Challenge the ArchaeologicalAnalyst when the location does not fit settlement patterns.
- If the topography analysis shows no features, say 'Rejected'.";

/// Standing instructions for a panel role.
pub fn role_instructions(role: PanelRole) -> &'static str {
    match role {
        PanelRole::Coordinator => COORDINATOR,
        PanelRole::Analyst => ANALYST,
        PanelRole::TerrainSpecialist => TERRAIN,
        PanelRole::EnvironmentalExpert => ENVIRONMENTAL,
    }
}

/// Seed message for the panel. Only the topography result is included.
pub fn build_initial_context(
    site_id: &str,
    coordinates: Coordinates,
    historical_context: Option<&str>,
    topography: Option<&AnalysisResult>,
) -> String {
    let mut out = format!(
        "# Archaeological Site Analysis: {}\nCoordinates: {}, {}\n",
        site_id, coordinates.latitude, coordinates.longitude
    );

    if let Some(history) = historical_context.filter(|h| !h.trim().is_empty()) {
        out.push_str(&format!("\n## Historical Context\n{}\n", history.trim()));
    }

    if let Some(result) = topography {
        out.push_str("\n## Topography Analysis Results:\n");
        out.push_str(&format!("Caption: {}\n", result.caption));
        if !result.tags.is_empty() {
            out.push_str(&format!("Tags: {}\n", result.tags.join(", ")));
        }
        if !result.features.is_empty() {
            out.push_str("Archaeological Features from Topography Results:\n");
            for feature in &result.features {
                out.push_str(&format!(
                    "- {} (Confidence: {:.1}%)\n  Description: {}\n",
                    feature.name,
                    feature.confidence * 100.0,
                    feature.description
                ));
            }
        }
        out.push_str("All the above features are detected from topography analysis results.\n");
    }

    out.push_str("\n## Team Task\n");
    out.push_str("1. Evaluate each detected feature and its confidence score\n");
    out.push_str("2. Decide whether features are archaeological or natural formations\n");
    out.push_str("3. Decide whether the site should be reported to archaeologists\n");
    out.push_str(&format!(
        "4. The {} moderates the discussion\n",
        PanelRole::Coordinator.agent_name()
    ));
    out
}

/// Render the transcript as the user turn for the next speaker.
pub fn render_transcript(transcript: &Transcript, next: PanelRole) -> String {
    let mut out = String::new();
    for message in transcript.messages() {
        match message.author {
            Author::Context => out.push_str(&format!("{}\n\n", message.message)),
            Author::System | Author::Panel(_) => out.push_str(&format!(
                "[{}]: {}\n\n",
                message.agent_name, message.message
            )),
        }
    }
    out.push_str(&format!(
        "You are {} ({}). Reply with your next contribution only.",
        next.agent_name(),
        next.description()
    ));
    out
}
