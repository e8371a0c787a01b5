//! Client questionnaire attached to every project.
//!
//! The form is stored as a JSONB blob so the question set can evolve without
//! migrations; this module is the typed view over that blob.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answers the client fills in after a project is created.
///
/// Every field defaults so that partial or older blobs still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireForm {
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub business_description: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub has_logo: bool,
    #[serde(default)]
    pub has_content: bool,
    #[serde(default)]
    pub reference_sites: Vec<String>,
    #[serde(default)]
    pub color_preferences: String,
    #[serde(default)]
    pub desired_sections: Vec<String>,
    #[serde(default)]
    pub extra_notes: String,
}

impl QuestionnaireForm {
    /// Decode a stored blob, tolerating anything malformed.
    pub fn from_value(value: &Value) -> QuestionnaireForm {
        if !value.is_object() {
            return QuestionnaireForm::default();
        }
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Whether the client has answered enough for work to start.
    pub fn is_complete(&self) -> bool {
        !self.business_name.trim().is_empty() && !self.business_description.trim().is_empty()
    }
}
