use anyhow::{Context as _, Result};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{MonitorConfig, StoreConfig};
use crate::context::{render_prompt, AggregatorHandle, ContextAggregator, ContextState, ContextView};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::{Activity, Context};
use crate::ports::{PermissionKind, TextAnalyzer};
use crate::privacy::PrivacyFilter;
use crate::router::ActivityRouter;
use crate::sensing::{Capabilities, CaptureContext, SensingController, SourceKind, SourceState};
use crate::store::ContextStore;

/// Owns the whole pipeline: capture sources, router, aggregator and the
/// retention sweep. Built explicitly and started/shut down explicitly.
pub struct Monitor {
    config: MonitorConfig,
    router: ActivityRouter,
    privacy: Arc<PrivacyFilter>,
    store: Arc<ContextStore>,
    analyzer: Arc<dyn TextAnalyzer>,
    metrics: MetricsCollector,
    sensing: SensingController,
    aggregator: Option<AggregatorHandle>,
    retention: Option<(JoinHandle<()>, CancellationToken)>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        caps: Capabilities,
        privacy: Arc<PrivacyFilter>,
        store: Arc<ContextStore>,
        analyzer: Arc<dyn TextAnalyzer>,
        metrics: MetricsCollector,
    ) -> Self {
        let router = ActivityRouter::new(config.router.recent_capacity);
        let ctx = CaptureContext {
            router: router.clone(),
            privacy: Arc::clone(&privacy),
            metrics: metrics.clone(),
        };
        let sensing = SensingController::new(
            caps,
            ctx,
            config.keystrokes.clone(),
            config.capture.clone(),
        );

        Self {
            config,
            router,
            privacy,
            store,
            analyzer,
            metrics,
            sensing,
            aggregator: None,
            retention: None,
        }
    }

    /// Restore saved contexts and start aggregation and the retention sweep.
    /// Capture sources stay disabled until enabled individually.
    pub async fn start(&mut self) -> Result<()> {
        if self.aggregator.is_some() {
            return Ok(());
        }

        let history_capacity = self.config.aggregator.history_capacity;
        let store = Arc::clone(&self.store);
        // One extra: the newest becomes current, the rest fill history.
        let saved = tokio::task::spawn_blocking(move || store.load(history_capacity + 1))
            .await
            .context("context load worker join failed")?;
        let initial = match saved {
            Ok(saved) => {
                info!("restored {} saved context(s)", saved.len());
                ContextState::restore(saved, history_capacity)
            }
            Err(err) => {
                error!("could not load saved contexts: {err}");
                ContextState::new(history_capacity)
            }
        };

        let aggregator = ContextAggregator::new(
            self.config.aggregator.clone(),
            Arc::clone(&self.analyzer),
            Some(Arc::clone(&self.store)),
            self.metrics.clone(),
        );
        self.aggregator = Some(aggregator.spawn(initial, self.router.subscribe()));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(retention_loop(
            Arc::clone(&self.store),
            self.config.store.clone(),
            cancel.clone(),
        ));
        self.retention = Some((handle, cancel));

        info!("monitor started; data in {}", self.config.data_dir.display());
        Ok(())
    }

    pub async fn set_source_enabled(&mut self, kind: SourceKind, enabled: bool) -> Result<SourceState> {
        self.sensing.set_enabled(kind, enabled).await
    }

    pub fn permission_changed(&mut self, permission: PermissionKind) {
        self.sensing.permission_changed(permission);
    }

    pub fn status(&self) -> BTreeMap<SourceKind, SourceState> {
        self.sensing.status()
    }

    /// Newest first.
    pub fn recent_activities(&self) -> Vec<Activity> {
        self.router.recent()
    }

    /// `None` before [`Monitor::start`].
    pub fn contexts(&self) -> Option<watch::Receiver<ContextView>> {
        self.aggregator.as_ref().map(AggregatorHandle::subscribe)
    }

    pub fn current_context(&self) -> Context {
        self.aggregator
            .as_ref()
            .map_or_else(Context::placeholder, AggregatorHandle::current)
    }

    pub fn current_prompt(&self) -> String {
        render_prompt(&self.current_context())
    }

    pub fn exclude_app(&self, app_id: &str) -> Result<()> {
        self.privacy.exclude_app(app_id)
    }

    pub fn include_app(&self, app_id: &str) -> Result<()> {
        self.privacy.include_app(app_id)
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }

    /// Stop capture first so pending keystrokes reach the router, then the
    /// aggregator and the retention sweep.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sensing.shutdown().await?;

        if let Some(aggregator) = self.aggregator.take() {
            aggregator.shutdown().await?;
        }
        if let Some((handle, cancel)) = self.retention.take() {
            cancel.cancel();
            handle.await.context("retention task failed to join")?;
        }
        info!("monitor stopped");
        Ok(())
    }
}

async fn retention_loop(store: Arc<ContextStore>, config: StoreConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.retention_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let store = Arc::clone(&store);
                let days = config.retention_days;
                match tokio::task::spawn_blocking(move || store.cleanup(days)).await {
                    Ok(Ok(removed)) => info!("retention sweep removed {removed} context(s)"),
                    Ok(Err(err)) => warn!("retention sweep failed: {err}"),
                    Err(err) => warn!("retention worker failed: {err}"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
