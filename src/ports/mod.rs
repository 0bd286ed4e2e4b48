//! Capability ports: the OS-level collaborators the core consumes but does
//! not implement (keyboard hooks, screen grabbing, OCR, credential storage,
//! permission checks, key-value config and text analysis).
//!
//! None of these failures are fatal to the pipeline. A port that returns
//! `None` or an error is treated as "temporarily unavailable" and the caller
//! retries on its next tick or on a permission-changed signal.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The application currently holding keyboard focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundApp {
    pub name: String,
    pub bundle_id: Option<String>,
}

impl ForegroundApp {
    pub fn new(name: impl Into<String>, bundle_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            bundle_id: bundle_id.map(String::from),
        }
    }

    /// Identifier used for privacy checks; empty when the app has no bundle id.
    pub fn id(&self) -> &str {
        self.bundle_id.as_deref().unwrap_or("")
    }

    /// Two foreground readings refer to the same app.
    pub fn same_app(&self, other: &ForegroundApp) -> bool {
        match (&self.bundle_id, &other.bundle_id) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => self.name == other.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Char(String),
    Enter,
    Backspace,
}

/// A raw key-down observed by the key source, tagged with the app that was
/// frontmost when it happened.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    pub key: Key,
    pub app: ForegroundApp,
    pub at: DateTime<Utc>,
}

impl KeyEvent {
    pub fn new(key: Key, app: ForegroundApp) -> Self {
        Self {
            key,
            app,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionKind {
    Accessibility,
    InputMonitoring,
    ScreenRecording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Availability {
    Granted,
    Denied,
    Unavailable,
}

/// Delivers key-down events into `sink` until `stop` is called.
pub trait KeyEventSource: Send + Sync {
    fn start(&self, sink: mpsc::Sender<KeyEvent>) -> Result<()>;
    fn stop(&self);
}

pub trait ForegroundAppSource: Send + Sync {
    fn current(&self) -> Option<ForegroundApp>;
}

/// Grabs the current screen as encoded image bytes (PNG).
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>>;
}

pub trait ScreenTextExtractor: Send + Sync {
    fn extract(&self, image: &[u8]) -> Option<String>;
}

/// Holds a single secret string, such as the context encryption key.
pub trait SecretStore: Send + Sync {
    fn get(&self) -> Result<Option<String>>;
    fn set(&self, value: &str) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

pub trait PermissionProbe: Send + Sync {
    fn status(&self, kind: PermissionKind) -> Availability;
}

/// Key → string-list persistence for small user preferences.
pub trait ConfigStore: Send + Sync {
    fn string_list(&self, key: &str) -> Vec<String>;
    fn set_string_list(&self, key: &str, values: &[String]) -> Result<()>;
}

/// Natural-language helpers used to summarize a window of activity.
pub trait TextAnalyzer: Send + Sync {
    /// Up to `limit` keywords, most frequent first.
    fn keywords(&self, text: &str, limit: usize) -> Vec<String>;
    fn sentences(&self, text: &str) -> Vec<String>;
}

/// Read-only `SecretStore` backed by an environment variable.
pub struct EnvSecretStore {
    var: String,
}

impl EnvSecretStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var)
            .ok()
            .filter(|value| !value.trim().is_empty()))
    }

    fn set(&self, _value: &str) -> Result<()> {
        anyhow::bail!("{} is read-only; export the key instead", self.var)
    }

    fn delete(&self) -> Result<()> {
        anyhow::bail!("{} is read-only", self.var)
    }
}
