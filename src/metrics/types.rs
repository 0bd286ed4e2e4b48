use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timing of a single context synthesis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisMetrics {
    pub timestamp: DateTime<Utc>,
    pub activity_count: usize,
    pub keyword_count: usize,
    pub duration_ms: u64,
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    /// Published activities keyed by activity type
    pub published: BTreeMap<String, u64>,
    pub noise_discarded: u64,
    pub capture_failures: u64,
    pub ocr_skipped_unchanged: u64,
    pub contexts_computed: u64,
    pub contexts_significant: u64,
    pub save_failures: u64,
    pub recent_syntheses: Vec<SynthesisMetrics>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            system: SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
            published: BTreeMap::new(),
            noise_discarded: 0,
            capture_failures: 0,
            ocr_skipped_unchanged: 0,
            contexts_computed: 0,
            contexts_significant: 0,
            save_failures: 0,
            recent_syntheses: Vec::new(),
        }
    }
}
