mod types;

pub use types::{MetricsSnapshot, SynthesisMetrics, SystemMetrics};

use std::collections::BTreeMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

use crate::models::ActivityKind;

const MAX_RECENT_SYNTHESES: usize = 20;
const SLOW_SYNTHESIS_MS: u64 = 100;

/// Pipeline counters shared by the capture tasks and the aggregator.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct Counters {
    published: BTreeMap<String, u64>,
    noise_discarded: u64,
    capture_failures: u64,
    ocr_skipped_unchanged: u64,
    contexts_computed: u64,
    contexts_significant: u64,
    save_failures: u64,
}

struct MetricsState {
    counters: Counters,
    recent_syntheses: Vec<SynthesisMetrics>,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                counters: Counters::default(),
                recent_syntheses: Vec::with_capacity(MAX_RECENT_SYNTHESES),
                system,
                pid,
            })),
        }
    }

    pub async fn record_published(&self, kind: ActivityKind) {
        let mut state = self.inner.lock().await;
        *state
            .counters
            .published
            .entry(kind.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub async fn record_noise_discarded(&self) {
        self.inner.lock().await.counters.noise_discarded += 1;
    }

    pub async fn record_capture_failure(&self) {
        self.inner.lock().await.counters.capture_failures += 1;
    }

    pub async fn record_ocr_skipped(&self) {
        self.inner.lock().await.counters.ocr_skipped_unchanged += 1;
    }

    pub async fn record_save_failure(&self) {
        self.inner.lock().await.counters.save_failures += 1;
    }

    pub async fn record_synthesis(&self, metrics: SynthesisMetrics) {
        if metrics.duration_ms > SLOW_SYNTHESIS_MS {
            log::debug!(
                "Context synthesis over {} activities took {}ms",
                metrics.activity_count,
                metrics.duration_ms
            );
        }

        let mut state = self.inner.lock().await;
        state.counters.contexts_computed += 1;
        if metrics.significant {
            state.counters.contexts_significant += 1;
        }
        state.recent_syntheses.push(metrics);
        if state.recent_syntheses.len() > MAX_RECENT_SYNTHESES {
            state.recent_syntheses.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        // Refresh to get current CPU/RAM
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system = match state.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
        };

        let counters = &state.counters;
        MetricsSnapshot {
            system,
            published: counters.published.clone(),
            noise_discarded: counters.noise_discarded,
            capture_failures: counters.capture_failures,
            ocr_skipped_unchanged: counters.ocr_skipped_unchanged,
            contexts_computed: counters.contexts_computed,
            contexts_significant: counters.contexts_significant,
            save_failures: counters.save_failures,
            recent_syntheses: state.recent_syntheses.clone(),
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.counters = Counters::default();
        state.recent_syntheses.clear();
        // Re-establish baseline for CPU after reset
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
