use anyhow::{Context as _, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::phash::{compute_phash, ScreenChangeDetector};
use super::CaptureContext;
use crate::config::CaptureConfig;
use crate::models::{Activity, ActivityKind};
use crate::ports::{ForegroundAppSource, ScreenCapture, ScreenTextExtractor};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Periodically reads the text on screen for the foreground app.
pub struct ScreenPoller {
    foreground: Arc<dyn ForegroundAppSource>,
    capture: Arc<dyn ScreenCapture>,
    extractor: Arc<dyn ScreenTextExtractor>,
    ctx: CaptureContext,
    config: CaptureConfig,
    detector: ScreenChangeDetector,
}

impl ScreenPoller {
    pub fn new(
        foreground: Arc<dyn ForegroundAppSource>,
        capture: Arc<dyn ScreenCapture>,
        extractor: Arc<dyn ScreenTextExtractor>,
        ctx: CaptureContext,
        config: CaptureConfig,
    ) -> Self {
        let detector =
            ScreenChangeDetector::new(config.phash_change_threshold, config.ocr_cooldown);
        Self {
            foreground,
            capture,
            extractor,
            ctx,
            config,
            detector,
        }
    }

    /// One capture pass. `Ok(None)` means the tick was skipped.
    pub async fn poll_once(&mut self) -> Result<Option<Activity>> {
        let Some(app) = self.foreground.current() else {
            log_debug!("no foreground app; skipping screen capture");
            return Ok(None);
        };
        if self.ctx.privacy.is_excluded(app.id()) {
            log_debug!("{} is excluded; skipping screen capture", app.name);
            return Ok(None);
        }

        let capture = Arc::clone(&self.capture);
        let image_bytes = tokio::task::spawn_blocking(move || capture.capture())
            .await
            .context("screen capture worker join failed")?
            .context("screen capture failed")?;
        let image_bytes = Arc::new(image_bytes);

        let phash = if self.config.skip_unchanged_screens {
            let bytes = Arc::clone(&image_bytes);
            match tokio::task::spawn_blocking(move || compute_phash(&bytes))
                .await
                .context("phash worker join failed")?
            {
                Ok(phash) => Some(phash),
                Err(err) => {
                    log_debug!("could not fingerprint frame: {err}");
                    None
                }
            }
        } else {
            None
        };

        if !self.detector.should_extract(phash.as_deref(), Instant::now()) {
            log_debug!("screen unchanged for {}; skipping OCR", app.name);
            self.ctx.metrics.record_ocr_skipped().await;
            return Ok(None);
        }

        let extractor = Arc::clone(&self.extractor);
        let bytes = Arc::clone(&image_bytes);
        let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .context("ocr worker join failed")?;
        self.detector.record(phash, Instant::now());

        let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
            log_debug!("no text extracted for {}", app.name);
            return Ok(None);
        };

        let activity = Activity::new(
            ActivityKind::ScreenContent,
            Utc::now(),
            app.name,
            app.bundle_id,
            Some(self.ctx.privacy.redact(&text)),
        );
        self.ctx.publish(activity.clone()).await;
        Ok(Some(activity))
    }
}

pub fn spawn(poller: ScreenPoller, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(screen_loop(poller, cancel))
}

async fn screen_loop(mut poller: ScreenPoller, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(poller.config.screen_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timeout = poller.config.capture_timeout;
    log_info!("screen capture started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = tokio::time::timeout(timeout, poller.poll_once()).await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        log_warn!("screen capture failed: {err:?}");
                        poller.ctx.metrics.record_capture_failure().await;
                    }
                    Err(_) => {
                        log_warn!("screen capture timeout (> {}s)", timeout.as_secs());
                        poller.ctx.metrics.record_capture_failure().await;
                    }
                }
            }
            _ = cancel.cancelled() => {
                log_info!("screen capture shutting down");
                break;
            }
        }
    }
}
