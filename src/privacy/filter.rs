use anyhow::Result;
use regex::Regex;
use std::sync::{Arc, RwLock};

use crate::ports::ConfigStore;

pub const USER_EXCLUDED_APPS_KEY: &str = "userExcludedApps";
pub const REDACTION_MARKER: &str = "[REDACTED]";

const BUILTIN_EXCLUDED_APPS: &[&str] = &[
    "com.apple.Safari",
    "com.google.Chrome",
    "com.apple.mail",
    "com.apple.iChat",
    "com.apple.Messages",
    "com.tinyspeck.slackmacgap",
    "com.apple.keychainaccess",
];

const SENSITIVE_TERMS: &[&str] = &[
    "password",
    "credit",
    "ssn",
    "social security",
    "account",
    "secret",
    "private",
    "confidential",
];

/// Decides which apps may be observed and scrubs sensitive text from
/// captured content.
pub struct PrivacyFilter {
    config: Arc<dyn ConfigStore>,
    user_excluded: RwLock<Vec<String>>,
    patterns: Vec<Regex>,
}

impl PrivacyFilter {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        let user_excluded = config.string_list(USER_EXCLUDED_APPS_KEY);
        Self {
            config,
            user_excluded: RwLock::new(user_excluded),
            patterns: sensitive_patterns(),
        }
    }

    pub fn is_excluded(&self, app_id: &str) -> bool {
        BUILTIN_EXCLUDED_APPS.contains(&app_id)
            || self
                .user_excluded
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .iter()
                .any(|excluded| excluded == app_id)
    }

    pub fn user_excluded_apps(&self) -> Vec<String> {
        self.user_excluded
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn exclude_app(&self, app_id: &str) -> Result<()> {
        let mut guard = self
            .user_excluded
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.iter().any(|excluded| excluded == app_id) {
            return Ok(());
        }
        guard.push(app_id.to_string());
        log::info!("Excluding {app_id} from monitoring");
        self.config.set_string_list(USER_EXCLUDED_APPS_KEY, &guard)
    }

    pub fn include_app(&self, app_id: &str) -> Result<()> {
        let mut guard = self
            .user_excluded
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(index) = guard.iter().position(|excluded| excluded == app_id) else {
            return Ok(());
        };
        guard.remove(index);
        log::info!("Re-including {app_id} in monitoring");
        self.config.set_string_list(USER_EXCLUDED_APPS_KEY, &guard)
    }

    /// Replaces every sensitive term, together with up to 20 characters of
    /// surrounding text on each side, with [`REDACTION_MARKER`].
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&redacted) {
                redacted = pattern
                    .replace_all(&redacted, REDACTION_MARKER)
                    .into_owned();
            }
        }
        redacted
    }
}

fn sensitive_patterns() -> Vec<Regex> {
    SENSITIVE_TERMS
        .iter()
        .filter_map(|term| {
            let pattern = format!(r"(?i)\b.{{0,20}}\b{}\b.{{0,20}}\b", regex::escape(term));
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    log::error!("invalid redaction pattern for '{term}': {err}");
                    None
                }
            }
        })
        .collect()
}
