use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::app_tracker::{self, AppTracker};
use super::keystrokes;
use super::screen::{self, ScreenPoller};
use super::{Capabilities, CaptureContext};
use crate::config::{CaptureConfig, KeystrokeConfig};
use crate::ports::{Availability, PermissionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Keystrokes,
    Screen,
    Apps,
}

impl SourceKind {
    /// Keystrokes first so shutdown flushes typing before anything else stops.
    pub const ALL: [SourceKind; 3] = [SourceKind::Keystrokes, SourceKind::Screen, SourceKind::Apps];

    pub fn permission(self) -> PermissionKind {
        match self {
            SourceKind::Keystrokes => PermissionKind::InputMonitoring,
            SourceKind::Screen => PermissionKind::ScreenRecording,
            SourceKind::Apps => PermissionKind::Accessibility,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceState {
    Disabled,
    Running,
    Blocked(Availability),
}

struct RunningSource {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

struct SourceSlot {
    enabled: bool,
    state: SourceState,
    running: Option<RunningSource>,
}

impl SourceSlot {
    /// A task that ended on its own (its source went away) no longer counts
    /// as running; it is reported unavailable so a permission change retries it.
    fn effective_state(&self) -> SourceState {
        match &self.running {
            Some(running) if running.handle.is_finished() => {
                SourceState::Blocked(Availability::Unavailable)
            }
            _ => self.state,
        }
    }

    fn reap_finished(&mut self) {
        if self
            .running
            .as_ref()
            .is_some_and(|running| running.handle.is_finished())
        {
            self.running = None;
            self.state = SourceState::Blocked(Availability::Unavailable);
        }
    }
}

/// Starts and stops the capture tasks. Permission is checked when a source
/// is enabled and again only when told the permission changed.
pub struct SensingController {
    caps: Capabilities,
    ctx: CaptureContext,
    keystrokes: KeystrokeConfig,
    capture: CaptureConfig,
    slots: BTreeMap<SourceKind, SourceSlot>,
}

impl SensingController {
    pub fn new(
        caps: Capabilities,
        ctx: CaptureContext,
        keystrokes: KeystrokeConfig,
        capture: CaptureConfig,
    ) -> Self {
        let slots = SourceKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    SourceSlot {
                        enabled: false,
                        state: SourceState::Disabled,
                        running: None,
                    },
                )
            })
            .collect();
        Self {
            caps,
            ctx,
            keystrokes,
            capture,
            slots,
        }
    }

    pub fn state(&self, kind: SourceKind) -> SourceState {
        self.slots
            .get(&kind)
            .map_or(SourceState::Disabled, SourceSlot::effective_state)
    }

    pub fn status(&self) -> BTreeMap<SourceKind, SourceState> {
        self.slots
            .iter()
            .map(|(kind, slot)| (*kind, slot.effective_state()))
            .collect()
    }

    pub async fn set_enabled(&mut self, kind: SourceKind, enabled: bool) -> Result<SourceState> {
        if enabled {
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.enabled = true;
            }
            Ok(self.try_start(kind))
        } else {
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.enabled = false;
            }
            self.stop(kind).await?;
            Ok(SourceState::Disabled)
        }
    }

    /// Retry every enabled source blocked on `permission`.
    pub fn permission_changed(&mut self, permission: PermissionKind) {
        let retry: Vec<SourceKind> = self
            .slots
            .iter()
            .filter(|(kind, slot)| {
                kind.permission() == permission
                    && slot.enabled
                    && matches!(slot.effective_state(), SourceState::Blocked(_))
            })
            .map(|(kind, _)| *kind)
            .collect();

        for kind in retry {
            info!("{permission:?} changed; retrying {kind:?}");
            self.try_start(kind);
        }
    }

    fn try_start(&mut self, kind: SourceKind) -> SourceState {
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.reap_finished();
        }
        let already_running = self
            .slots
            .get(&kind)
            .is_some_and(|slot| slot.running.is_some());
        if already_running {
            return SourceState::Running;
        }

        let availability = self.caps.permissions.status(kind.permission());
        let state = if availability != Availability::Granted {
            warn!("{kind:?} blocked: {:?} is {availability:?}", kind.permission());
            SourceState::Blocked(availability)
        } else {
            let cancel_token = CancellationToken::new();
            match self.spawn_source(kind, cancel_token.clone()) {
                Ok(handle) => {
                    info!("{kind:?} capture running");
                    if let Some(slot) = self.slots.get_mut(&kind) {
                        slot.running = Some(RunningSource {
                            handle,
                            cancel_token,
                        });
                    }
                    SourceState::Running
                }
                Err(err) => {
                    warn!("{kind:?} capture could not start: {err:?}");
                    SourceState::Blocked(Availability::Unavailable)
                }
            }
        };

        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.state = state;
        }
        state
    }

    fn spawn_source(&self, kind: SourceKind, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let handle = match kind {
            SourceKind::Keystrokes => keystrokes::spawn(
                Arc::clone(&self.caps.keys),
                self.ctx.clone(),
                self.keystrokes.clone(),
                cancel,
            )?,
            SourceKind::Screen => screen::spawn(
                ScreenPoller::new(
                    Arc::clone(&self.caps.foreground),
                    Arc::clone(&self.caps.screen),
                    Arc::clone(&self.caps.ocr),
                    self.ctx.clone(),
                    self.capture.clone(),
                ),
                cancel,
            ),
            SourceKind::Apps => app_tracker::spawn(
                AppTracker::new(Arc::clone(&self.caps.foreground), self.ctx.clone()),
                self.capture.app_interval,
                cancel,
            ),
        };
        Ok(handle)
    }

    async fn stop(&mut self, kind: SourceKind) -> Result<()> {
        let Some(slot) = self.slots.get_mut(&kind) else {
            return Ok(());
        };
        slot.state = SourceState::Disabled;
        let Some(running) = slot.running.take() else {
            return Ok(());
        };

        running.cancel_token.cancel();
        running
            .handle
            .await
            .with_context(|| format!("{kind:?} capture task failed to join"))
    }

    /// Stop every source, keystrokes first so pending typing is flushed.
    pub async fn shutdown(&mut self) -> Result<()> {
        for kind in SourceKind::ALL {
            if let Some(slot) = self.slots.get_mut(&kind) {
                slot.enabled = false;
            }
            if let Err(err) = self.stop(kind).await {
                warn!("{err:?}");
            }
        }
        Ok(())
    }
}
