use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keystroke coalescing thresholds.
#[derive(Debug, Clone)]
pub struct KeystrokeConfig {
    /// Quiet period after the last key before the buffer is published
    pub debounce: Duration,
    /// Buffer length (in characters) that forces an immediate publish
    pub max_buffer_chars: usize,
    /// Buffers shorter than this, without a newline, are discarded as noise
    pub min_publish_chars: usize,
    /// Capacity of the channel the key source writes into
    pub queue_capacity: usize,
}

impl Default for KeystrokeConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            max_buffer_chars: 100,
            min_publish_chars: 3,
            queue_capacity: 256,
        }
    }
}

/// Polling intervals for the screen and foreground-app adapters.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub screen_interval: Duration,
    pub app_interval: Duration,
    /// Upper bound on a single screen capture + OCR pass
    pub capture_timeout: Duration,
    /// Skip OCR when the screen looks unchanged since the last OCR'd frame
    pub skip_unchanged_screens: bool,
    /// Minimum perceptual-hash distance that counts as a changed screen
    pub phash_change_threshold: u32,
    /// An unchanged screen is still OCR'd once this much time has passed
    pub ocr_cooldown: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screen_interval: Duration::from_secs(5),
            app_interval: Duration::from_secs(1),
            capture_timeout: Duration::from_secs(10),
            skip_unchanged_screens: true,
            phash_change_threshold: 8,
            ocr_cooldown: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub recent_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 100,
        }
    }
}

/// Context aggregation tunables. The exact values are empirical; only the
/// threshold mechanism matters.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub window_capacity: usize,
    /// Recompute after this many new activities
    pub trigger_threshold: usize,
    /// Recompute at least this often while the window is non-empty
    pub recompute_interval: Duration,
    pub history_capacity: usize,
    /// Keyword overlap below which a new context counts as significant
    pub significance_threshold: f64,
    pub max_keywords: usize,
    /// Summaries shorter than this fall back to per-application counts
    pub min_summary_chars: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_capacity: 50,
            trigger_threshold: 5,
            recompute_interval: Duration::from_secs(30),
            history_capacity: 20,
            significance_threshold: 0.5,
            max_keywords: 10,
            min_summary_chars: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub directory: PathBuf,
    pub retention_days: u32,
    pub retention_sweep_interval: Duration,
}

impl StoreConfig {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            directory: data_dir.join("Contexts"),
            retention_days: 30,
            retention_sweep_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub data_dir: PathBuf,
    pub keystrokes: KeystrokeConfig,
    pub capture: CaptureConfig,
    pub router: RouterConfig,
    pub aggregator: AggregatorConfig,
    pub store: StoreConfig,
}

impl MonitorConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            store: StoreConfig::in_dir(&data_dir),
            data_dir,
            keystrokes: KeystrokeConfig::default(),
            capture: CaptureConfig::default(),
            router: RouterConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }

    /// Defaults with `GLIMPSE_DEBUG` and `GLIMPSE_RETENTION_DAYS` applied.
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(data_dir);

        let debug_mode = std::env::var("GLIMPSE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            config.aggregator.recompute_interval = Duration::from_secs(5);
        }

        if let Ok(value) = std::env::var("GLIMPSE_RETENTION_DAYS") {
            match value.trim().parse::<u32>() {
                Ok(days) => config.store.retention_days = days,
                Err(err) => log::warn!("Ignoring GLIMPSE_RETENTION_DAYS={value}: {err}"),
            }
        }

        config
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}
