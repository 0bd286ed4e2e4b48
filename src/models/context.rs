use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Activity;

pub const PLACEHOLDER_SUMMARY: &str = "No activity recorded yet";

/// A synthesized, point-in-time description of a window of activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    /// Newest first.
    pub activities: Vec<Activity>,
    pub keywords: Vec<String>,
    pub main_application: Option<String>,
}

impl Context {
    /// The context in effect before any activity has been aggregated.
    pub fn placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            summary: PLACEHOLDER_SUMMARY.to_string(),
            activities: Vec::new(),
            keywords: Vec::new(),
            main_application: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.activities.is_empty() && self.summary == PLACEHOLDER_SUMMARY
    }
}
