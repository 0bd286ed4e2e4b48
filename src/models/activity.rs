use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Keystroke,
    ScreenContent,
    AppSwitch,
    MouseMovement,
    BrowserNav,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Keystroke => "keystroke",
            ActivityKind::ScreenContent => "screen_content",
            ActivityKind::AppSwitch => "app_switch",
            ActivityKind::MouseMovement => "mouse_movement",
            ActivityKind::BrowserNav => "browser_nav",
        }
    }
}

/// One captured unit of user behavior.
///
/// `content` has already passed through the privacy filter by the time an
/// `Activity` is constructed by a capture handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    pub application: String,
    pub app_id: Option<String>,
    pub content: Option<String>,
}

impl Activity {
    pub fn new(
        kind: ActivityKind,
        timestamp: DateTime<Utc>,
        application: impl Into<String>,
        app_id: Option<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp,
            application: application.into(),
            app_id,
            content,
        }
    }

    /// Content trimmed of surrounding whitespace, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_under_type_key() {
        let activity = Activity::new(
            ActivityKind::AppSwitch,
            Utc::now(),
            "Editor",
            Some("com.example.editor".into()),
            None,
        );

        let value = serde_json::to_value(&activity).unwrap();
        assert_eq!(value["type"], "app_switch");
        assert_eq!(value["appId"], "com.example.editor");
    }

    #[test]
    fn blank_content_has_no_text() {
        let activity = Activity::new(
            ActivityKind::Keystroke,
            Utc::now(),
            "Editor",
            None,
            Some("  \n".into()),
        );
        assert_eq!(activity.text(), None);
    }
}
