use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CaptureContext;
use crate::config::KeystrokeConfig;
use crate::models::{Activity, ActivityKind};
use crate::ports::{ForegroundApp, Key, KeyEvent, KeyEventSource};
use crate::privacy::PrivacyFilter;
use crate::utils::{sleep_until_deadline, Debounce};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Result of flushing a non-empty buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Flush {
    Published(Activity),
    /// Too short to be meaningful; dropped without publishing.
    Discarded,
}

/// Turns individual key-downs into phrase-level keystroke activities.
///
/// Pure state machine: time is passed in, nothing is spawned. The owning
/// task feeds it events and wakes it at [`KeystrokeCoalescer::deadline`].
pub struct KeystrokeCoalescer {
    privacy: Arc<PrivacyFilter>,
    config: KeystrokeConfig,
    buffer: String,
    app: Option<ForegroundApp>,
    last_key_at: Option<DateTime<Utc>>,
    debounce: Debounce,
}

impl KeystrokeCoalescer {
    pub fn new(privacy: Arc<PrivacyFilter>, config: KeystrokeConfig) -> Self {
        let debounce = Debounce::new(config.debounce);
        Self {
            privacy,
            config,
            buffer: String::new(),
            app: None,
            last_key_at: None,
            debounce,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn app(&self) -> Option<&ForegroundApp> {
        self.app.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn on_key(&mut self, event: KeyEvent, now: Instant) -> Vec<Flush> {
        let mut flushed = Vec::new();
        if self.privacy.is_excluded(event.app.id()) {
            return flushed;
        }

        let switched = self
            .app
            .as_ref()
            .is_some_and(|current| !current.same_app(&event.app));
        if switched {
            flushed.extend(self.flush());
        }
        self.app = Some(event.app);
        self.last_key_at = Some(event.at);

        match event.key {
            Key::Enter => {
                self.buffer.push('\n');
                flushed.extend(self.flush());
                return flushed;
            }
            Key::Backspace => {
                self.buffer.pop();
            }
            Key::Char(text) => self.buffer.push_str(&text),
        }

        if self.buffer.chars().count() >= self.config.max_buffer_chars {
            flushed.extend(self.flush());
        } else {
            self.debounce.reset(now);
        }
        flushed
    }

    /// Flush once the quiet period after the last key has elapsed.
    pub fn on_deadline(&mut self, now: Instant) -> Option<Flush> {
        if !self.debounce.is_due(now) {
            return None;
        }
        self.flush()
    }

    /// Flush whatever is pending, then forget the app tag.
    pub fn disable(&mut self) -> Option<Flush> {
        let flushed = self.flush();
        self.app = None;
        self.last_key_at = None;
        flushed
    }

    fn flush(&mut self) -> Option<Flush> {
        self.debounce.cancel();
        if self.buffer.is_empty() {
            return None;
        }

        let text = std::mem::take(&mut self.buffer);
        if text.chars().count() < self.config.min_publish_chars && !text.contains('\n') {
            return Some(Flush::Discarded);
        }

        let (application, app_id) = match &self.app {
            Some(app) => (app.name.clone(), app.bundle_id.clone()),
            None => ("Unknown".to_string(), None),
        };
        Some(Flush::Published(Activity::new(
            ActivityKind::Keystroke,
            self.last_key_at.unwrap_or_else(Utc::now),
            application,
            app_id,
            Some(self.privacy.redact(&text)),
        )))
    }
}

/// Start `source` and spawn the task that owns the coalescer. Fails when the
/// key source cannot be started.
pub fn spawn(
    source: Arc<dyn KeyEventSource>,
    ctx: CaptureContext,
    config: KeystrokeConfig,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    source.start(tx).context("key event source failed to start")?;

    let coalescer = KeystrokeCoalescer::new(Arc::clone(&ctx.privacy), config);
    Ok(tokio::spawn(keystroke_loop(source, coalescer, rx, ctx, cancel)))
}

async fn keystroke_loop(
    source: Arc<dyn KeyEventSource>,
    mut coalescer: KeystrokeCoalescer,
    mut events: mpsc::Receiver<KeyEvent>,
    ctx: CaptureContext,
    cancel: CancellationToken,
) {
    log_info!("keystroke capture started");

    loop {
        let deadline = coalescer.deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                emit(&ctx, coalescer.disable()).await;
                log_info!("keystroke capture shutting down");
                break;
            }
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    emit(&ctx, coalescer.disable()).await;
                    log_warn!("key event source closed its channel");
                    break;
                };
                for flushed in coalescer.on_key(event, Instant::now()) {
                    emit(&ctx, Some(flushed)).await;
                }
            }
            _ = sleep_until_deadline(deadline) => {
                emit(&ctx, coalescer.on_deadline(Instant::now())).await;
            }
        }
    }

    source.stop();
}

async fn emit(ctx: &CaptureContext, flushed: Option<Flush>) {
    match flushed {
        Some(Flush::Published(activity)) => ctx.publish(activity).await,
        Some(Flush::Discarded) => {
            log_debug!("discarded short keystroke buffer");
            ctx.metrics.record_noise_discarded().await;
        }
        None => {}
    }
}
