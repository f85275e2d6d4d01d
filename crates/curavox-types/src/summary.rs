//! The structured medical summary produced at session end.

use serde::{Deserialize, Serialize};

/// Structured summary of a completed conversation.
///
/// The shape is fixed: every field is always present, even when summary
/// generation fails. The LLM gateway substitutes [`MedicalSummary::fallback`]
/// when the provider's output cannot be parsed into this shape, so
/// downstream consumers never see a partial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalSummary {
    /// One-line description of the main issue.
    pub chief_complaint: String,
    /// Narrative of symptoms, timeline, and characteristics.
    pub history_of_present_illness: String,
    /// Relevant history points mentioned in the conversation.
    pub relevant_history: Vec<String>,
    /// Clinical impression.
    pub assessment: String,
    /// Recommended next steps.
    pub recommendations: Vec<String>,
}

impl MedicalSummary {
    /// The documented fallback record used when generation fails.
    pub fn fallback() -> Self {
        Self {
            chief_complaint: "Unable to generate summary".to_string(),
            history_of_present_illness: "Please review the conversation transcript.".to_string(),
            relevant_history: Vec::new(),
            assessment: "Manual review required".to_string(),
            recommendations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_shape() {
        let summary = MedicalSummary::fallback();
        assert_eq!(summary.chief_complaint, "Unable to generate summary");
        assert_eq!(summary.assessment, "Manual review required");
        assert!(summary.relevant_history.is_empty());
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn test_summary_json_roundtrip() {
        let json = r#"{
            "chief_complaint": "Headache for three days",
            "history_of_present_illness": "Throbbing frontal pain, worse in the morning.",
            "relevant_history": ["No prior migraines"],
            "assessment": "Likely tension headache",
            "recommendations": ["Hydration", "Rest"]
        }"#;
        let parsed: MedicalSummary = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.chief_complaint, "Headache for three days");
        assert_eq!(parsed.recommendations.len(), 2);

        let back = serde_json::to_string(&parsed).unwrap();
        let reparsed: MedicalSummary = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed, parsed);
    }

    #[test]
    fn test_summary_rejects_missing_fields() {
        let json = r#"{"chief_complaint": "Headache"}"#;
        assert!(serde_json::from_str::<MedicalSummary>(json).is_err());
    }
}
